use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, CheckError};

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects
    pub final_url: String,
}

/// Fetches a URL and returns its fully rendered document. Target pages
/// inject prices client-side, so a plain HTTP fetch is not enough.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, CheckError>;
}

/// Closes the tab on every exit path, including errors and panics inside
/// the rendering closure. Leaked tabs accumulate as live Chrome targets.
struct TabGuard {
    tab: Arc<Tab>,
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        let _ = self.tab.close(true);
    }
}

pub struct ChromeRenderer {
    browser: Browser,
    user_agent: String,
    timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(config: &ScraperConfig) -> Result<Self, AppError> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Often needed in containerized environments
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        // Set Chrome path if provided
        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        Ok(Self {
            browser,
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout),
        })
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, CheckError> {
        let browser = self.browser.clone();
        let url = url.to_string();
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;

        // headless_chrome drives the DevTools protocol over blocking I/O
        tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| CheckError::Fetch(format!("failed to open tab: {}", e)))?;
            let _guard = TabGuard {
                tab: Arc::clone(&tab),
            };

            tab.set_default_timeout(timeout);
            tab.set_user_agent(&user_agent, None, None)
                .map_err(|e| CheckError::Fetch(format!("failed to set user agent: {}", e)))?;

            tab.navigate_to(&url)
                .map_err(|e| CheckError::Fetch(format!("navigation failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| CheckError::Fetch(format!("page load failed: {}", e)))?;

            let html = tab
                .get_content()
                .map_err(|e| CheckError::Fetch(format!("failed to get page content: {}", e)))?;

            let final_url = {
                let current = tab.get_url();
                if current.is_empty() { url } else { current }
            };

            Ok(RenderedPage { html, final_url })
        })
        .await
        .map_err(|e| CheckError::Fetch(format!("render task failed: {}", e)))?
    }
}
