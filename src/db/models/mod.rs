#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so existing imports like
//! `use crate::db::models::*;` continue to work.

pub mod push_subscription;
pub mod reminder_delivery;
pub mod task;
pub mod task_event;

pub use self::push_subscription::*;
pub use self::reminder_delivery::*;
pub use self::task::*;
pub use self::task_event::*;
