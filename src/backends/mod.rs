// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access
//!
//! - [`camera`]: The camera device contract and its adapters

pub mod camera;
