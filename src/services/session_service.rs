use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dto::attendance_dto::{AttendanceUpsert, AttendanceView};
use crate::error::{Error, Result};
use crate::models::attendance::{RecordId, SubjectScope};
use crate::services::realtime_service::RealtimeHub;
use crate::services::repository::AttendanceRepository;
use crate::services::view_session::ViewSession;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub search: String,
    pub limit: usize,
}

pub enum SessionCommand {
    View {
        request: ViewRequest,
        reply: oneshot::Sender<AttendanceView>,
    },
    SetScope {
        scope: SubjectScope,
        request: ViewRequest,
        reply: oneshot::Sender<AttendanceView>,
    },
    Refresh {
        request: ViewRequest,
        reply: oneshot::Sender<AttendanceView>,
    },
    Save {
        rows: Vec<AttendanceUpsert>,
        request: ViewRequest,
        reply: oneshot::Sender<Result<(usize, AttendanceView)>>,
    },
    Delete {
        id: RecordId,
        request: ViewRequest,
        reply: oneshot::Sender<Result<AttendanceView>>,
    },
    Close,
}

/// Cheap handle to a running view session task.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    scope: Arc<RwLock<SubjectScope>>,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope as of the last scope change the session applied.
    pub async fn scope(&self) -> SubjectScope {
        self.scope.read().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn view(&self, request: ViewRequest) -> Result<AttendanceView> {
        self.call(|reply| SessionCommand::View { request, reply }).await
    }

    pub async fn set_scope(&self, scope: SubjectScope, request: ViewRequest) -> Result<AttendanceView> {
        let view = self
            .call(|reply| SessionCommand::SetScope {
                scope: scope.clone(),
                request,
                reply,
            })
            .await?;
        *self.scope.write().await = scope;
        Ok(view)
    }

    pub async fn refresh(&self, request: ViewRequest) -> Result<AttendanceView> {
        self.call(|reply| SessionCommand::Refresh { request, reply }).await
    }

    pub async fn save(
        &self,
        rows: Vec<AttendanceUpsert>,
        request: ViewRequest,
    ) -> Result<(usize, AttendanceView)> {
        self.call(|reply| SessionCommand::Save {
            rows,
            request,
            reply,
        })
        .await?
    }

    pub async fn delete(&self, id: RecordId, request: ViewRequest) -> Result<AttendanceView> {
        self.call(|reply| SessionCommand::Delete { id, request, reply })
            .await?
    }

    pub async fn close(&self) -> Result<()> {
        self.commands
            .send(SessionCommand::Close)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)
    }
}

/// Opens a view session and runs it on its own task. Returns once the
/// initial load is done. The session ends by itself after `idle_timeout`
/// without a command.
pub async fn spawn_session<R: AttendanceRepository>(
    repo: Arc<R>,
    hub: RealtimeHub,
    scope: SubjectScope,
    idle_timeout: Duration,
) -> SessionHandle {
    let session = ViewSession::open(repo, hub, scope.clone()).await;
    let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
    let handle = SessionHandle {
        id: session.id(),
        scope: Arc::new(RwLock::new(scope)),
        commands,
    };
    tokio::spawn(run_session(session, receiver, idle_timeout));
    handle
}

/// Serializes commands and realtime changes for one session. Commands win
/// when both are ready so a caller never waits behind a burst of changes.
pub async fn run_session<R: AttendanceRepository>(
    mut session: ViewSession<R>,
    mut commands: mpsc::Receiver<SessionCommand>,
    idle_timeout: Duration,
) {
    let id = session.id();
    let idle = sleep_until(Instant::now() + idle_timeout);
    tokio::pin!(idle);
    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else { break };
                if !handle_command(&mut session, command).await {
                    break;
                }
                idle.as_mut().reset(Instant::now() + idle_timeout);
            }
            Some(event) = session.next_event(), if session.is_subscribed() => {
                session.apply(event).await;
            }
            () = &mut idle => {
                info!(session_id = %id, idle_secs = idle_timeout.as_secs(), "view session idle, closing");
                break;
            }
        }
    }
    info!(session_id = %id, "view session closed");
}

async fn handle_command<R: AttendanceRepository>(
    session: &mut ViewSession<R>,
    command: SessionCommand,
) -> bool {
    // Changes already queued are applied first so a view never lags behind
    // events the hub delivered before the command.
    session.drain_pending().await;
    match command {
        SessionCommand::View { request, reply } => {
            let _ = reply.send(session.view(&request.search, request.limit));
        }
        SessionCommand::SetScope {
            scope,
            request,
            reply,
        } => {
            session.set_scope(scope).await;
            let _ = reply.send(session.view(&request.search, request.limit));
        }
        SessionCommand::Refresh { request, reply } => {
            session.resync().await;
            let _ = reply.send(session.view(&request.search, request.limit));
        }
        SessionCommand::Save {
            rows,
            request,
            reply,
        } => {
            let result = session
                .save(rows)
                .await
                .map(|saved| (saved, session.view(&request.search, request.limit)));
            let _ = reply.send(result);
        }
        SessionCommand::Delete { id, request, reply } => {
            let result = session
                .delete(&id)
                .await
                .map(|_| session.view(&request.search, request.limit));
            let _ = reply.send(result);
        }
        SessionCommand::Close => {
            debug!(session_id = %session.id(), "close requested");
            return false;
        }
    }
    true
}

/// Open view sessions by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id(), handle);
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionHandle> {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(handle) if !handle.is_closed() => Ok(handle.clone()),
            _ => Err(Error::NotFound(format!("Session {} not found", id))),
        }
    }

    pub async fn remove(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.write().await.remove(&id)
    }

    /// Drops handles whose task has already exited.
    pub async fn prune(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
