use crate::model::{BackendConfig, Device, GenerationRequest, InferenceBackend};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};

#[derive(Debug, thiserror::Error)]
pub enum PaligemmaBackendError {
    #[error(transparent)]
    Model(#[from] PaligemmaError),
    #[error("failed to convert image: {0}")]
    Image(String),
    #[error("model has already been released")]
    Released,
}

/// Paligemma running through kornia-vlm.
pub struct PaligemmaBackend {
    model: Option<Paligemma>,
    device: Device,
}

impl InferenceBackend for PaligemmaBackend {
    type Error = PaligemmaBackendError;

    fn initialize(config: &BackendConfig) -> Result<Self, Self::Error> {
        let device = match config.device {
            Device::Auto if cfg!(feature = "cuda") => Device::Cuda,
            Device::Auto => Device::Cpu,
            Device::Cuda if !cfg!(feature = "cuda") => {
                log::warn!("Built without the `cuda` feature, falling back to the CPU");
                Device::Cpu
            }
            other => other,
        };
        log::info!(
            "Initializing Paligemma ({}, {}) on {device}",
            config.model_id,
            config.precision.as_str()
        );

        let model = Paligemma::new(PaligemmaConfig::default())?;
        Ok(Self {
            model: Some(model),
            device,
        })
    }

    fn generate(&mut self, request: GenerationRequest) -> Result<String, Self::Error> {
        let model = self.model.as_mut().ok_or(PaligemmaBackendError::Released)?;

        let (width, height) = request.image.dimensions();
        let image = Image::<u8, 3, CpuAllocator>::new(
            ImageSize {
                width: width as usize,
                height: height as usize,
            },
            request.image.into_raw(),
            CpuAllocator,
        )
        .map_err(|e| PaligemmaBackendError::Image(e.to_string()))?;

        let text = model.inference(
            &image,
            &request.instruction,
            request.params.max_new_tokens,
            false,
        )?;
        Ok(text)
    }

    fn device(&self) -> Device {
        self.device
    }

    fn release(&mut self) {
        self.model.take();
    }
}
