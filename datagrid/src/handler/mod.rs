//! HTTP route handlers.

pub mod datagrid;
pub mod objects;
