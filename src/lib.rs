//! Dictare: push-to-talk dictation for Linux
//!
//! This library provides the core functionality for:
//! - Detecting hotkey presses via evdev (kernel-level, works on all compositors)
//! - Capturing audio via cpal as a stream of fixed-duration frames
//! - Deciding when the speaker stopped talking (streaming silence detector)
//! - Transcribing speech using whisper.cpp (fast, local, offline)
//! - Outputting text via wtype with a clipboard fallback
//!
//! # Architecture
//!
//! ```text
//!   Hotkey (evdev) ──events──▶ Coordinator (single-flight)
//!                                   │ creates at most one
//!                                   ▼
//!                             Recording Session ◀──frames── Audio (cpal)
//!                                   │ feeds energy
//!                                   ▼
//!                             Silence Detector
//!                                   │ AutoStop / AbortEmpty
//!                                   ▼
//!                             finished buffer
//!                                   │
//!                                   ▼
//!                             Model Host (lazy, exclusive) ──▶ whisper
//!                                   │ text
//!                                   ▼
//!                             Output chain (wtype → clipboard)
//! ```
//!
//! The coordinator is the only component that creates sessions; a start
//! trigger while one is active is ignored, so overlapping captures cannot
//! exist. The model host owns the single expensive engine instance and
//! serializes loading and inference behind one lock.

pub mod audio;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod detector;
pub mod error;
pub mod hotkey;
pub mod model;
pub mod output;
pub mod session;
pub mod setup;
pub mod text;
pub mod transcribe;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{DictareError, Result};
