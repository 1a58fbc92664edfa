use super::preprocess::Preprocessor;
use super::types::{ModelTier, SegmentationModel, SegmentationResult};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ndarray::{Array1, ArrayD, IxDyn};
use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// Number of recurrent state tensors (r1..r4) RVM carries between frames
const RECURRENT_STATES: usize = 4;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states, fed back in the next frame
    hidden: Option<[ArrayD<f32>; RECURRENT_STATES]>,

    // Ratio the model downsamples its input by before the encoder
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// The tier picks the input resolution. Hidden states run at a quarter
    /// of it (downsample ratio 0.25).
    pub fn new<P: AsRef<Path>>(model_path: P, tier: ModelTier) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {} ({:?} tier)", path.display(), tier);

        let session = Session::builder()?
            .with_execution_providers(execution_providers())?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let (width, height) = tier.input_size();

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            hidden: None,
            downsample_ratio: 0.25,
        })
    }

    /// Zeroed hidden states; the network broadcasts them up on the first frame
    fn initial_hidden_states() -> [ArrayD<f32>; RECURRENT_STATES] {
        tracing::debug!("Initializing RVM hidden states");
        std::array::from_fn(|_| ArrayD::zeros(IxDyn(&[1, 1, 1, 1])))
    }
}

/// GPU providers in order of preference; ort falls back to the CPU when
/// none of them can be registered
fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    vec![
        TensorRTExecutionProvider::default().build(),
        CUDAExecutionProvider::default().build(),
    ]
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: RgbImage) -> Result<SegmentationResult> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let hidden = self
            .hidden
            .take()
            .unwrap_or_else(Self::initial_hidden_states);

        let input_tensor = self.preprocessor.preprocess(&frame);

        let [r1, r2, r3, r4] = hidden;

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        let infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                Tensor::from_array(input_tensor)?,
                Tensor::from_array(r1)?,
                Tensor::from_array(r2)?,
                Tensor::from_array(r3)?,
                Tensor::from_array(r4)?,
                Tensor::from_array(Array1::from_elem(1, self.downsample_ratio))?,
            ])
            .context("Failed to run inference")?;
        drop(infer_span);

        // Outputs: fgr, pha, r1o, r2o, r3o, r4o
        if outputs.len() < 2 + RECURRENT_STATES {
            return Err(anyhow!(
                "RVM returned {} outputs, expected {}",
                outputs.len(),
                2 + RECURRENT_STATES
            ));
        }

        let pha = outputs[1].try_extract_array::<f32>()?;
        let matte_shape = pha.shape().to_vec();
        if matte_shape.len() != 4 {
            return Err(anyhow!("unexpected matte shape {:?}", matte_shape));
        }
        let matte_height = matte_shape[2] as u32;
        let matte_width = matte_shape[3] as u32;
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        let next_hidden = (2..2 + RECURRENT_STATES)
            .map(|i| Ok(outputs[i].try_extract_array::<f32>()?.to_owned()))
            .collect::<Result<Vec<_>>>()?;
        drop(outputs);
        self.hidden = Some(
            next_hidden
                .try_into()
                .map_err(|_| anyhow!("RVM returned a partial recurrent state"))?,
        );

        let (frame_width, frame_height) = frame.dimensions();
        let mask = Preprocessor::postprocess_matte(
            matte_flat,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )?;

        Ok(SegmentationResult { frame, mask })
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.hidden = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
