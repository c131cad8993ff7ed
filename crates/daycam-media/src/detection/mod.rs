//! Person detection.
//!
//! Inference is delegated to an [`InferenceBackend`] which returns raw
//! candidate rows. Everything after the forward pass is backend independent:
//!
//! | Stage | Module |
//! |-------|--------|
//! | Forward pass | `darknet` (OpenCV DNN) or any custom backend |
//! | Row decoding, person filter, denormalization | `decode` |
//! | Duplicate suppression | `nms` |
//!
//! Use [`PersonDetector::load`] to build a detector from model artifacts.

pub mod backend;
#[cfg(feature = "opencv")]
pub mod darknet;
pub mod decode;
pub mod detector;
pub mod nms;

pub use backend::{CoordinateSpace, DecodeLayout, InferenceBackend};
pub use decode::decode_candidates;
pub use detector::{DetectorConfig, ModelBackend, PersonDetector};
pub use nms::non_maximum_suppression;
