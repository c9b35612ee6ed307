use crate::config::TensorLayout;
use crate::error::{ClassifierError, Result};
use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Runs a single preprocessed image through a model and returns its scores.
pub trait InferenceBackend: Send + Sync {
    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>>;

    /// Number of scores the model produces, when known ahead of time.
    fn output_width(&self) -> Option<usize> {
        None
    }
}

pub struct OnnxBackend {
    plan: OnnxPlan,
    output_width: Option<usize>,
}

fn model_error(e: TractError) -> ClassifierError {
    ClassifierError::Inference(e.to_string())
}

impl OnnxBackend {
    pub fn load<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        layout: TensorLayout,
    ) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        let shape = match layout {
            TensorLayout::Nhwc => tvec!(1, h, w, 3),
            TensorLayout::Nchw => tvec!(1, 3, h, w),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path.as_ref())
            .map_err(model_error)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .map_err(model_error)?
            .into_optimized()
            .map_err(model_error)?
            .into_runnable()
            .map_err(model_error)?;

        let output_width = plan
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        tracing::info!(
            "Loaded ONNX model from {} (output width: {:?})",
            path.as_ref().display(),
            output_width
        );

        Ok(Self { plan, output_width })
    }
}

impl InferenceBackend for OnnxBackend {
    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let shape = input.shape().to_vec();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(&shape, &data).map_err(model_error)?;

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(model_error)?;
        let output = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".to_string()))?;
        let view = output.to_array_view::<f32>().map_err(model_error)?;

        Ok(view.iter().copied().collect())
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixture/models/tiny-garbage.onnx");

    #[test]
    fn fixture_model_reports_output_width() {
        let backend = OnnxBackend::load(FIXTURE_MODEL, 300, 300, TensorLayout::Nhwc).unwrap();
        assert_eq!(backend.output_width(), Some(6));
    }

    #[test]
    fn fixture_model_runs_on_pinned_shape() {
        let backend = OnnxBackend::load(FIXTURE_MODEL, 300, 300, TensorLayout::Nhwc).unwrap();

        // Pure green input: only the "metal" column is weighted by the green mean.
        let mut input = Array4::<f32>::zeros((1, 300, 300, 3));
        input.index_axis_mut(ndarray::Axis(3), 1).fill(1.0);
        let scores = backend.run(input).unwrap();

        assert_eq!(scores.len(), 6);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!(scores[2] > 0.99);
    }

    #[test]
    fn layout_must_match_model_input() {
        let result = OnnxBackend::load(FIXTURE_MODEL, 300, 300, TensorLayout::Nchw);
        assert!(matches!(result, Err(ClassifierError::Inference(_))));
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        let result = OnnxBackend::load("/no/such/model.onnx", 300, 300, TensorLayout::Nhwc);
        assert!(matches!(result, Err(ClassifierError::Inference(_))));
    }
}
