//! Engine behaviour against an in-memory SQLite store and a scripted remote.

mod answers;
mod dispatch;
mod support;
