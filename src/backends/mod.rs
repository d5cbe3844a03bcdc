// SPDX-License-Identifier: GPL-3.0-only

//! Host service implementations
//!
//! The engine never talks to hardware or to a media library directly. It is
//! handed a set of trait objects ([`CaptureEnvironment`](crate::capture::CaptureEnvironment)
//! for capture, [`CollectionView`](crate::grid::CollectionView) and
//! [`ImageCacheManager`](crate::library::ImageCacheManager) for the grid), and
//! a backend supplies them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Presentation Layer              │
//! └────────────────────┬────────────────────────┘
//!                      │ delegates / PickerEvent
//! ┌────────────────────┴────────────────────────┐
//! │                 Engine                       │
//! │  ┌─────────────────┐   ┌─────────────────┐  │
//! │  │ CaptureSession  │   │  Grid (cache,   │  │
//! │  │ (session queue) │   │  coordinator)   │  │
//! │  └────────┬────────┘   └────────┬────────┘  │
//! └───────────┼─────────────────────┼───────────┘
//!             │ traits              │ traits
//! ┌───────────┴─────────────────────┴───────────┐
//! │               Backend Layer                  │
//! │           ┌──────────────────┐               │
//! │           │  Virtual Camera  │               │
//! │           └──────────────────┘               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`virtual_camera`]: software backend used by the CLI and the tests

pub mod virtual_camera;
