//! Penalty worker: process wiring for the overdue penalty scheduler.

pub mod app;
