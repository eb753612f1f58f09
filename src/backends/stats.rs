use crate::model::{BackendConfig, Device, GenerationRequest, InferenceBackend};

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("the stats backend only runs on the CPU, '{0}' was requested")]
    UnsupportedDevice(Device),
    #[error("cannot describe an empty image")]
    EmptyImage,
}

/// A dependency-free backend that describes an image from its pixel
/// statistics. Useful for running the gateway without model weights.
#[derive(Debug)]
pub struct StatsBackend {
    model_id: String,
}

impl InferenceBackend for StatsBackend {
    type Error = StatsError;

    fn initialize(config: &BackendConfig) -> Result<Self, Self::Error> {
        if config.device == Device::Cuda {
            return Err(StatsError::UnsupportedDevice(config.device));
        }
        Ok(Self {
            model_id: config.model_id.clone(),
        })
    }

    fn generate(&mut self, request: GenerationRequest) -> Result<String, Self::Error> {
        let (width, height) = request.image.dimensions();
        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 {
            return Err(StatsError::EmptyImage);
        }

        let mut sums = [0u64; 3];
        for pixel in request.image.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += u64::from(channel);
            }
        }
        let [r, g, b] = sums.map(|sum| sum / pixels);
        let luma = (299 * r + 587 * g + 114 * b) / 1000;
        let tone = match luma {
            0..=63 => "dark",
            64..=191 => "medium",
            _ => "bright",
        };

        let text = format!(
            "[{}] A {width}x{height} {tone} image with an average color of rgb({r}, {g}, {b}). \
             Instruction received: {}",
            self.model_id, request.instruction
        );

        // honor the token budget, counting whitespace-separated words
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > request.params.max_new_tokens {
            return Ok(words[..request.params.max_new_tokens].join(" "));
        }
        Ok(text)
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn release(&mut self) {
        log::debug!("Releasing stats backend for {}", self.model_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationParams, Precision};
    use image::{Rgb, RgbImage};

    fn backend() -> StatsBackend {
        StatsBackend::initialize(&BackendConfig {
            model_id: "stats".to_string(),
            device: Device::Auto,
            precision: Precision::Float32,
        })
        .unwrap()
    }

    #[test]
    fn describes_average_color() {
        let image = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let text = backend()
            .generate(GenerationRequest {
                image,
                instruction: "What color is this?".to_string(),
                params: GenerationParams::default(),
            })
            .unwrap();
        assert!(text.contains("10x10"));
        assert!(text.contains("rgb(255, 0, 0)"));
        assert!(text.ends_with("What color is this?"));
    }

    #[test]
    fn truncates_to_token_budget() {
        let text = backend()
            .generate(GenerationRequest {
                image: RgbImage::new(4, 4),
                instruction: "a b c d e f".to_string(),
                params: GenerationParams {
                    max_new_tokens: 3,
                    ..GenerationParams::default()
                },
            })
            .unwrap();
        assert_eq!(text.split_whitespace().count(), 3);
    }

    #[test]
    fn rejects_cuda() {
        let err = StatsBackend::initialize(&BackendConfig {
            model_id: "stats".to_string(),
            device: Device::Cuda,
            precision: Precision::Float16,
        })
        .unwrap_err();
        assert!(matches!(err, StatsError::UnsupportedDevice(Device::Cuda)));
    }
}
