pub mod attendance_dto;
pub mod member_dto;
pub mod webhook_dto;
