// SPDX-License-Identifier: GPL-3.0-only

//! Capture activities
//!
//! Each activity (still capture, video recording) owns a [`state::StateMachine`]
//! and follows the same lifecycle:
//!
//! ```text
//!   Idle ──init──▶ Init ──start──▶ Run
//!    ▲              │  ◀──stop───   │
//!    └───uninit─────┘               │ fault
//!                                   ▼
//!                                 Error ──uninit──▶ Idle
//! ```
//!
//! # Modules
//!
//! - [`capture_loop`]: Stoppable worker thread driving periodic captures
//! - [`photo`]: Still capture by interval and count
//! - [`state`]: The shared activity state machine
//! - [`video`]: Continuous recording to a file

pub mod capture_loop;
pub mod photo;
pub mod state;
pub mod video;
