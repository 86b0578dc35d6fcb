//! Claimboard: a role-scoped restoration job board.
//!
//! | Module    | Responsibility                                              |
//! |-----------|-------------------------------------------------------------|
//! | `access`  | Role capabilities, scope resolution, navigation filtering   |
//! | `board`   | Lanes, transitions, drag-and-drop sessions                  |
//! | `store`   | SQLite persistence and the live change feed                 |
//! | `server`  | axum HTTP API and WebSocket board sessions                  |
//! | `config`  | `claimboard.toml` loading and validation                    |
//! | `logging` | tracing subscriber setup                                    |
//! | `errors`  | Typed error enums shared across modules                     |

pub mod access;
pub mod board;
pub mod config;
pub mod errors;
pub mod logging;
pub mod server;
pub mod store;
