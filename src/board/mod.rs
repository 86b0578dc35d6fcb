//! Workflow board: lanes, transitions, and live drag sessions.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ drag/drop ┌─────────────────────────────────────────────────┐
//! │  Client  │ ────────> │  session.rs  (BoardSession<S: JobStore>)        │
//! │          │ <──────── │    │  feed events, write results                │
//! └──────────┘  render   │    v                                            │
//!                        │  controller.rs  (BoardController state machine) │
//!                        │    │                                            │
//!                        │    │ authorize_and_compute(job, lane)           │
//!                        │    v                                            │
//!                        │  transition.rs  (TransitionEngine → JobPatch)   │
//!                        │    │                                            │
//!                        │    │ lane_of(job)                               │
//!                        │    v                                            │
//!                        │  lane.rs  (LaneId, status → lane mapping)       │
//!                        └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Typical Flow (drop a card on "in progress")
//!
//! 1. `drag_start` snapshots the lane order.
//! 2. `drop_on` asks the engine for a patch; the card moves optimistically.
//! 3. A detached task writes the patch through `JobStore::apply_patch`.
//! 4. The live feed delivers the authoritative record and the session goes
//!    back to idle. A rejected write reverts to the snapshot instead.

pub mod controller;
pub mod lane;
pub mod session;
pub mod transition;

pub use controller::{
    BoardController, BoardView, DropOutcome, DropTarget, ExternalOutcome, LaneColumn, LaneView,
    SessionPhase,
};
pub use lane::{LaneId, is_legal, lane_for, lane_of};
pub use session::{BoardSession, Notice, SessionEvent, SessionInput};
pub use transition::{Clock, FixedClock, JobPatch, SystemClock, TransitionEngine};
