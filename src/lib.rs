//! # TraceVis-RS: Multichannel Time-Series Viewer Engine
//!
//! The viewport rendering and annotation-interaction engine of a viewer for
//! large multichannel recordings (hundreds of channels, millions of samples).
//! It decides which samples to fetch for the current view, reduces them to
//! min/max envelopes that never drop a transient, composes a layered,
//! backend-agnostic draw list, and turns pointer/keyboard input into
//! undoable annotation edits.
//!
//! ## Architecture
//!
//! - **Source**: [`SampleSource`] / [`EventSource`] contracts implemented by
//!   the embedding application (file decoding is not part of this crate)
//! - **LOD**: a pyramid of envelope blocks behind an LRU byte budget, built
//!   on background workers
//! - **Viewport**: visible time/channel window, gains and stride derivation
//! - **Annotations**: single-writer store with immutable published snapshots
//!   and undo/redo
//! - **Render**: pure composition into a [`DrawList`], plus the overview bar
//! - **Interaction**: explicit input state machine
//! - **Communication**: crossbeam channels between the UI thread and the
//!   fetch workers
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracevis_rs::{
//!     config::ViewerConfig,
//!     interaction::{InputEvent, Key},
//!     source::{EventList, SyntheticSource, WavePattern},
//!     types::{ChannelInfo, ChannelType},
//!     Viewer,
//! };
//!
//! let channels = (0..64)
//!     .map(|i| ChannelInfo::new(i, format!("EEG {:03}", i), ChannelType::Eeg))
//!     .collect();
//! let source = Arc::new(SyntheticSource::new(channels, 1000.0, 1_000_000, WavePattern::default()));
//! let mut viewer = Viewer::new(source, Arc::new(EventList::default()), ViewerConfig::default())?;
//!
//! viewer.resize(1280.0, 720.0);
//! viewer.handle_input(InputEvent::key(Key::Right));
//! let frame = viewer.frame();
//! backend.paint(&frame.main);
//! ```

pub mod annotations;
pub mod config;
pub mod error;
pub mod interaction;
pub mod lod;
pub mod render;
pub mod source;
pub mod types;
pub mod viewer;
pub mod viewport;

// Re-export commonly used types
pub use annotations::{Annotation, AnnotationId, AnnotationStore, ChannelScope};
pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
pub use interaction::{InputEvent, InteractionController, SelectionState};
pub use lod::{LodCache, SampleWindow};
pub use render::{Composer, DrawList, Primitive};
pub use source::{EventSource, SampleSource};
pub use viewer::{Frame, Viewer};
pub use viewport::Viewport;
