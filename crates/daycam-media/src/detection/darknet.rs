//! Darknet YOLO inference through OpenCV DNN.
//!
//! Loads a `.weights` + `.cfg` pair with `cv::dnn::readNet` and forwards
//! frames through every unconnected output layer. Each output row is
//! `[cx, cy, w, h, objectness, class scores...]` with normalized geometry.

use std::path::Path;

use opencv::core::{Mat, Scalar, Size, Vector, CV_32F};
use opencv::dnn;
use opencv::prelude::*;
use tracing::{debug, info};

use super::backend::{DecodeLayout, InferenceBackend};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Pixel scale applied before the forward pass (1/255).
const PIXEL_SCALE: f64 = 1.0 / 255.0;

/// OpenCV DNN Darknet network.
pub struct DarknetBackend {
    net: dnn::Net,
    output_layers: Vector<String>,
    input_size: i32,
}

impl DarknetBackend {
    /// Load and validate the network.
    pub fn load(weights: &Path, topology: &Path, input_size: u32) -> MediaResult<Self> {
        let net = dnn::read_net(
            &weights.to_string_lossy(),
            &topology.to_string_lossy(),
            "",
        )
        .map_err(|e| MediaError::model_load(weights, format!("OpenCV readNet failed: {e}")))?;

        if net
            .empty()
            .map_err(|e| MediaError::model_load(weights, e.to_string()))?
        {
            return Err(MediaError::model_load(weights, "network has no layers"));
        }

        let output_layers = net
            .get_unconnected_out_layers_names()
            .map_err(|e| MediaError::model_load(topology, format!("no output layers: {e}")))?;
        if output_layers.is_empty() {
            return Err(MediaError::model_load(topology, "network has no output layers"));
        }

        info!(
            output_layers = ?output_layers.to_vec(),
            input_size,
            "Darknet network loaded"
        );

        Ok(Self {
            net,
            output_layers,
            input_size: input_size as i32,
        })
    }
}

impl InferenceBackend for DarknetBackend {
    fn name(&self) -> &str {
        "opencv-darknet"
    }

    fn layout(&self) -> DecodeLayout {
        DecodeLayout::DARKNET
    }

    fn forward(&mut self, frame: &Frame) -> MediaResult<Vec<Vec<f32>>> {
        let image = frame_to_mat(frame)?;

        // Frame is already RGB, which is what Darknet was trained on: no swap
        let blob = dnn::blob_from_image(
            &image,
            PIXEL_SCALE,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            false,
            false,
            CV_32F,
        )
        .map_err(cv_error)?;

        self.net
            .set_input(&blob, "", 1.0, Scalar::default())
            .map_err(cv_error)?;

        let mut outputs: Vector<Mat> = Vector::new();
        self.net
            .forward(&mut outputs, &self.output_layers)
            .map_err(cv_error)?;

        let mut rows = Vec::new();
        for output in outputs.iter() {
            for r in 0..output.rows() {
                let row = output.at_row::<f32>(r).map_err(cv_error)?;
                rows.push(row.to_vec());
            }
        }

        debug!(layers = outputs.len(), rows = rows.len(), "Darknet forward pass");
        Ok(rows)
    }
}

/// Copy an RGB frame into a `CV_8UC3` Mat.
pub(crate) fn frame_to_mat(frame: &Frame) -> MediaResult<Mat> {
    let flat = Mat::from_slice(frame.as_raw()).map_err(cv_error)?;
    let shaped = flat
        .reshape(3, frame.height() as i32)
        .map_err(cv_error)?;
    shaped.try_clone().map_err(cv_error)
}

fn cv_error(e: opencv::Error) -> MediaError {
    MediaError::inference(format!("OpenCV: {e}"))
}
