pub mod branch_calendar_repository;
pub mod plan_repository;
pub mod session_repository;
