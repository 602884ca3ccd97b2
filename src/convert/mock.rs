use super::ConversionService;
use crate::error::ErrorKind;
use crate::models::{Format, ImageRef};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
enum MockReply {
    Success(ImageRef),
    Failure(ErrorKind),
}

/// Scriptable conversion backend for tests and harnesses.
///
/// Queued replies are consumed in order; once the queue is empty every call
/// succeeds with `{source}#converted.{ext}`. A gated mock holds each call until
/// [`MockConversionService::release`] hands out a permit.
#[derive(Clone)]
pub struct MockConversionService {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<(ImageRef, Format)>>>,
    call_count: Arc<Mutex<usize>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockConversionService {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            gate: None,
        }
    }

    pub fn with_result(self, result: ImageRef) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Success(result));
        self
    }

    pub fn with_failure(self, kind: ErrorKind) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Failure(kind));
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `count` held calls complete. No-op on an ungated mock.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn get_requests(&self) -> Vec<(ImageRef, Format)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockConversionService {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_error(kind: ErrorKind) -> Error {
    let message = "Mock failure".to_string();
    match kind {
        ErrorKind::InvalidState => Error::InvalidState(message),
        ErrorKind::NotConfigured => Error::NotConfigured(message),
        ErrorKind::Unreachable => Error::Unreachable(message),
        ErrorKind::Timeout => Error::Timeout(message),
        ErrorKind::Unsupported => Error::Unsupported(message),
        ErrorKind::CopyFailed => Error::CopyFailed(message),
        ErrorKind::DirectoryCreateFailed => Error::DirectoryCreateFailed {
            path: PathBuf::from("mock"),
            source: std::io::Error::other(message),
        },
        ErrorKind::Internal => Error::Invariant(message),
    }
}

#[async_trait]
impl ConversionService for MockConversionService {
    async fn convert(&self, image: &ImageRef, format: Format) -> Result<ImageRef> {
        {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            self.requests.lock().unwrap().push((image.clone(), format));
        }

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Invariant(format!("Mock gate closed: {}", e)))?
                .forget();
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Success(result)) => Ok(result),
            Some(MockReply::Failure(kind)) => Err(mock_error(kind)),
            None => Ok(ImageRef::new(format!(
                "{}#converted.{}",
                image,
                format.extension()
            ))),
        }
    }
}
