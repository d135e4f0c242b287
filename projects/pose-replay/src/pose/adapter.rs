use super::{LandmarkSet, PoseDetector};
use crate::error::{DetectError, InitError};
use image::RgbImage;

/// Proof that the wrapped detector finished initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub detector: &'static str,
}

enum AdapterState {
    Uninitialized,
    Ready,
    Failed(InitError),
}

/// Wraps a `PoseDetector` and enforces its lifecycle: initialize once, then
/// detect. A failed initialization is remembered and never retried by this
/// instance; a retry means building a new adapter.
pub struct PoseAdapter {
    detector: Box<dyn PoseDetector>,
    state: AdapterState,
}

impl PoseAdapter {
    pub fn new(detector: Box<dyn PoseDetector>) -> Self {
        Self {
            detector,
            state: AdapterState::Uninitialized,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, AdapterState::Ready)
    }

    pub fn initialize(&mut self) -> Result<Ready, InitError> {
        match &self.state {
            AdapterState::Ready => {}
            AdapterState::Failed(err) => return Err(err.clone()),
            AdapterState::Uninitialized => {
                if let Err(err) = self.detector.initialize() {
                    tracing::error!(
                        "Pose detector '{}' failed to initialize: {}",
                        self.detector.name(),
                        err
                    );
                    self.state = AdapterState::Failed(err.clone());
                    return Err(err);
                }
                tracing::info!("Pose detector '{}' ready", self.detector.name());
                self.state = AdapterState::Ready;
            }
        }

        Ok(Ready {
            detector: self.detector.name(),
        })
    }

    pub fn detect(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
        if !self.is_ready() {
            return Err(DetectError::NotInitialized);
        }

        let result = self.detector.detect(image);
        if let Err(DetectError::Unavailable(reason)) = &result {
            self.state = AdapterState::Failed(InitError::Unavailable(reason.clone()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::simulated::NullDetector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDetector {
        init_calls: Arc<AtomicUsize>,
        fail_init: bool,
        fail_detect: bool,
    }

    impl PoseDetector for CountingDetector {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn initialize(&mut self) -> Result<(), InitError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(InitError::ModelLoad("bad weights".into()))
            } else {
                Ok(())
            }
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Option<LandmarkSet>, DetectError> {
            if self.fail_detect {
                Err(DetectError::Unavailable("device lost".into()))
            } else {
                Ok(Some(LandmarkSet::from_fn(|_| (0.5, 0.5, 0.0, 1.0))))
            }
        }
    }

    fn counting(fail_init: bool, fail_detect: bool) -> (PoseAdapter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = PoseAdapter::new(Box::new(CountingDetector {
            init_calls: calls.clone(),
            fail_init,
            fail_detect,
        }));
        (adapter, calls)
    }

    #[test]
    fn test_detect_before_initialize_fails() {
        let mut adapter = PoseAdapter::new(Box::new(NullDetector));
        let image = RgbImage::new(4, 4);
        assert_eq!(adapter.detect(&image), Err(DetectError::NotInitialized));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (mut adapter, calls) = counting(false, false);
        assert_eq!(adapter.initialize().unwrap().detector, "counting");
        adapter.initialize().unwrap();
        assert!(adapter.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let image = RgbImage::new(4, 4);
        assert!(adapter.detect(&image).unwrap().is_some());
    }

    #[test]
    fn test_failed_initialize_is_not_retried() {
        let (mut adapter, calls) = counting(true, false);
        assert!(adapter.initialize().is_err());
        assert!(adapter.initialize().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let image = RgbImage::new(4, 4);
        assert_eq!(adapter.detect(&image), Err(DetectError::NotInitialized));
    }

    #[test]
    fn test_unavailable_detector_stops_adapter() {
        let (mut adapter, _) = counting(false, true);
        adapter.initialize().unwrap();
        let image = RgbImage::new(4, 4);
        assert!(matches!(
            adapter.detect(&image),
            Err(DetectError::Unavailable(_))
        ));
        assert!(!adapter.is_ready());
        assert_eq!(adapter.detect(&image), Err(DetectError::NotInitialized));
    }
}
