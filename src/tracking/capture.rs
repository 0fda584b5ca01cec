//! Burndown capture through a signed-in browser, for teams whose chart is
//! only available on the sprint analytics page.

use std::time::Duration;

use anyhow::{Context, Result};
use thirtyfour::prelude::*;
use tokio::sync::Mutex;

use crate::config::BrowserConfig;

const USER_INPUT: &str = "#i0116";
const PASSWORD_INPUT: &str = "#i0118";
const SUBMIT_BUTTON: &str = "[type=submit]";
/// "Stay signed in?" prompt; answered with no.
const DECLINE_BUTTON: &str = "#idBtn_Back";

pub struct BurndownCapture {
    config: BrowserConfig,
    driver: Mutex<Option<WebDriver>>,
}

impl BurndownCapture {
    /// Nothing is started until the first capture.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            driver: Mutex::new(None),
        }
    }

    async fn start(&self) -> Result<WebDriver> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--headless=new")?;
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        WebDriver::new(&self.config.webdriver_url, caps)
            .await
            .with_context(|| format!("Failed to start browser at {}", self.config.webdriver_url))
    }

    /// Sign in at `url`, wait for the analytics page to settle, then return
    /// the chart element as a base64 PNG.
    pub async fn capture(&self, url: &str, user: &str, password: &str) -> Result<String> {
        let mut guard = self.driver.lock().await;
        if guard.is_none() {
            *guard = Some(self.start().await?);
        }
        let Some(driver) = guard.as_ref() else {
            anyhow::bail!("Browser session not started");
        };

        driver.goto(url).await.context("Navigation to analytics page failed")?;

        driver
            .find(By::Css(USER_INPUT))
            .await
            .context("Sign-in user field not found")?
            .send_keys(user)
            .await?;
        driver.find(By::Css(SUBMIT_BUTTON)).await?.click().await?;
        tokio::time::sleep(Duration::from_secs(self.config.login_wait_secs)).await;

        driver
            .find(By::Css(PASSWORD_INPUT))
            .await
            .context("Sign-in password field not found")?
            .send_keys(password)
            .await?;
        driver.find(By::Css(SUBMIT_BUTTON)).await?.click().await?;
        tokio::time::sleep(Duration::from_secs(self.config.login_wait_secs)).await;

        if let Ok(decline) = driver.find(By::Css(DECLINE_BUTTON)).await {
            decline.click().await?;
        }
        tokio::time::sleep(Duration::from_secs(self.config.render_wait_secs)).await;

        driver
            .find(By::Css(self.config.chart_selector.as_str()))
            .await
            .with_context(|| format!("Burndown chart '{}' not found", self.config.chart_selector))?
            .screenshot_as_png_base64()
            .await
            .context("Burndown screenshot failed")
    }

    /// Quit the browser if one was started.
    pub async fn close(&self) -> Result<()> {
        if let Some(driver) = self.driver.lock().await.take() {
            driver.quit().await.context("Failed to quit browser")?;
        }
        Ok(())
    }
}
