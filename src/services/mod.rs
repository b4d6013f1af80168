pub mod calendar_service;
pub mod schedule_utils;
pub mod scheduling_service;
pub mod slot_generator;
pub mod slot_reconciler;
