use crate::error::{Result, VoxchainError};
use crate::services::lock_log;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// An image returned by a generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Where the service published the image.
    pub url: String,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// Trait for prompt-to-image generation.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage>;
}

#[async_trait]
impl<T: ImageService + ?Sized> ImageService for Arc<T> {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        (**self).generate(prompt).await
    }
}

/// Mock image generator. The n-th call returns `mock://image/<n>`.
#[derive(Debug, Clone)]
pub struct MockImageGen {
    data: Vec<u8>,
    should_fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockImageGen {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageGen {
    pub fn new() -> Self {
        Self {
            data: b"\x89PNG".to_vec(),
            should_fail: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Returns every prompt received, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        lock_log(&self.prompts).clone()
    }
}

#[async_trait]
impl ImageService for MockImageGen {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage> {
        let index = {
            let mut prompts = lock_log(&self.prompts);
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };

        if self.should_fail {
            return Err(VoxchainError::ImageGeneration {
                message: "mock image failure".to_string(),
            });
        }

        Ok(GeneratedImage {
            url: format!("mock://image/{}", index),
            data: self.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_image_numbers_calls() {
        let images = MockImageGen::new().with_data(vec![1, 2, 3]);
        let first = images.generate("a cat").await.unwrap();
        let second = images.generate("a dog").await.unwrap();

        assert_eq!(first.url, "mock://image/0");
        assert_eq!(second.url, "mock://image/1");
        assert_eq!(second.data, vec![1, 2, 3]);
        assert_eq!(images.prompts(), vec!["a cat", "a dog"]);
    }

    #[tokio::test]
    async fn test_mock_image_failure() {
        let images = MockImageGen::new().with_failure();
        let err = images.generate("x").await.unwrap_err();
        assert_eq!(err.to_string(), "Image generation failed: mock image failure");
    }
}
