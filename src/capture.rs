use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::session::Capture;

// ── Surface ─────────────────────────────────────────────────────────────────

/// The page that renders the panorama and exposes its share link.
pub trait CaptureSurface {
    fn trigger_share(&mut self);
    fn share_link(&self) -> Option<String>;
    fn page_url(&self) -> String;
    /// Current `src` of the shared image; may be a placeholder until the
    /// real asset has loaded.
    fn image_source(&self) -> Option<String>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            spacing: Duration::from_secs(2),
        }
    }
}

fn is_real_image(source: &str) -> bool {
    !source.is_empty() && !source.contains(".svg")
}

/// Read the image source until it is a real asset or the attempts run out.
/// After the last attempt the last value read is returned as is.
pub fn poll_image_source<S>(surface: &S, policy: RetryPolicy, sleeper: &dyn Sleeper) -> Option<String>
where
    S: CaptureSurface + ?Sized,
{
    let mut last = None;
    for attempt in 1..=policy.attempts {
        last = surface.image_source();
        if last.as_deref().is_some_and(is_real_image) {
            debug!(attempt, "image source ready");
            return last;
        }
        if attempt < policy.attempts {
            sleeper.sleep(policy.spacing);
        }
    }
    warn!(attempts = policy.attempts, source = ?last, "image source never became ready");
    last
}

/// Share, then read the link, the page url and the image source in order.
pub fn capture<S>(
    surface: &mut S,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Capture, CaptureError>
where
    S: CaptureSurface + ?Sized,
{
    surface.trigger_share();
    let captured_image_ref = surface
        .share_link()
        .filter(|link| !link.is_empty())
        .ok_or(CaptureError::MissingShareLink)?;
    let source_view_ref = surface.page_url();
    let extracted_image_url = poll_image_source(surface, policy, sleeper);
    info!(link = %captured_image_ref, "captured");
    Ok(Capture {
        captured_image_ref,
        source_view_ref,
        extracted_image_url,
    })
}

// ── Operator form ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct FormFields {
    pub page_url: String,
    pub share_link: String,
    pub image_url: String,
    pub share_requested: bool,
}

/// Surface backed by fields the operator fills in from the browser. The
/// fields are shared with the UI so edits made while a capture is polling
/// are picked up.
#[derive(Clone, Default)]
pub struct FormSurface {
    fields: Arc<Mutex<FormFields>>,
}

impl FormSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> MutexGuard<'_, FormFields> {
        self.fields.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear the form for a newly displayed candidate.
    pub fn reset(&self, page_url: String) {
        *self.fields() = FormFields {
            page_url,
            ..FormFields::default()
        };
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl CaptureSurface for FormSurface {
    fn trigger_share(&mut self) {
        self.fields().share_requested = true;
    }

    fn share_link(&self) -> Option<String> {
        non_empty(&self.fields().share_link)
    }

    fn page_url(&self) -> String {
        self.fields().page_url.clone()
    }

    fn image_source(&self) -> Option<String> {
        non_empty(&self.fields().image_url)
    }
}
