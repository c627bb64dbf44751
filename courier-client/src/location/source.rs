//! Position sources

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{Permission, SensorError};

/// Device position provider
#[async_trait]
pub trait PositionSource: Send + Sync + std::fmt::Debug {
    /// Current permission without asking the partner
    async fn query_permission(&self) -> Permission;

    /// Ask the partner; resolves to `Granted` or `Denied`
    async fn request_permission(&self) -> Permission;

    /// One fix as `(latitude, longitude)`
    async fn current_position(&self) -> Result<(f64, f64), SensorError>;
}

#[derive(Debug)]
struct Script {
    permission: Permission,
    prompt_answer: Permission,
    position: Option<(f64, f64)>,
    latency: Option<Duration>,
    failures: Vec<SensorError>,
    samples: usize,
    prompts: usize,
}

/// Position source with a fixed, scriptable answer
///
/// Backs the headless panel (a configured position) and tests.
#[derive(Debug, Clone)]
pub struct FixedPositionSource {
    script: Arc<Mutex<Script>>,
}

impl FixedPositionSource {
    /// Granted source always answering `(latitude, longitude)`
    pub fn granted(latitude: f64, longitude: f64) -> Self {
        Self::with_permission(Permission::Granted, Some((latitude, longitude)))
    }

    /// Source whose permission is denied
    pub fn denied() -> Self {
        Self::with_permission(Permission::Denied, None)
    }

    pub fn with_permission(permission: Permission, position: Option<(f64, f64)>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                permission,
                prompt_answer: Permission::Denied,
                position,
                latency: None,
                failures: Vec::new(),
                samples: 0,
                prompts: 0,
            })),
        }
    }

    /// Answer given when the partner is prompted
    pub fn answer_prompt_with(self, answer: Permission) -> Self {
        self.script.lock().prompt_answer = answer;
        self
    }

    /// Delay every fix by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.script.lock().latency = latency;
    }

    /// Fail the next fix with `error`
    pub fn fail_next(&self, error: SensorError) {
        self.script.lock().failures.push(error);
    }

    pub fn set_position(&self, position: Option<(f64, f64)>) {
        self.script.lock().position = position;
    }

    /// Fixes requested so far
    pub fn samples(&self) -> usize {
        self.script.lock().samples
    }

    pub fn prompts(&self) -> usize {
        self.script.lock().prompts
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn query_permission(&self) -> Permission {
        self.script.lock().permission
    }

    async fn request_permission(&self) -> Permission {
        let mut script = self.script.lock();
        script.prompts += 1;
        script.permission = script.prompt_answer;
        script.permission
    }

    async fn current_position(&self) -> Result<(f64, f64), SensorError> {
        let latency = {
            let mut script = self.script.lock();
            script.samples += 1;
            script.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.script.lock();
        if !script.failures.is_empty() {
            return Err(script.failures.remove(0));
        }
        if !script.permission.is_granted() {
            return Err(SensorError::PermissionDenied);
        }
        script
            .position
            .ok_or_else(|| SensorError::Unavailable("no position fix".into()))
    }
}
