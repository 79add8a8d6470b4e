use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

use super::error::{BrowserError, BrowserResult};
use super::human::HumanPacing;
use super::page::{BrowserContextFactory, BrowserPage, PageElement};
use super::profile::{BrowserProfile, ProfileManager};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserConfig>,
    profiles: ProfileManager,
    pacing: HumanPacing,
}

impl BrowserLauncher {
    pub fn new(config: BrowserConfig, profiles: ProfileManager, pacing: HumanPacing) -> Self {
        Self {
            config: Arc::new(config),
            profiles,
            pacing,
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn profile_manager(&self) -> &ProfileManager {
        &self.profiles
    }

    pub async fn launch(&self) -> BrowserResult<ChromiumBrowser> {
        let expired = self.profiles.cleanup_expired()?;
        if expired > 0 {
            debug!(expired, "removed expired browser profiles");
        }
        let profile = self.profiles.allocate()?;
        let chromium_config = self.build_chromium_config(&profile)?;
        info!(
            profile = %profile.id(),
            headless = self.config.headless,
            width = self.config.viewport[0],
            height = self.config.viewport[1],
            "launching chromium"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        profile.touch().await?;

        Ok(ChromiumBrowser {
            browser: Arc::new(browser),
            profile,
            handler_task: Some(handler_task),
            pacing: self.pacing.clone(),
        })
    }

    fn build_chromium_config(&self, profile: &BrowserProfile) -> BrowserResult<ChromiumConfig> {
        let [width, height] = self.config.viewport;
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: width >= height,
                has_touch: false,
            });

        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={width},{height}"),
            "--no-first-run".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.lang {
            args.push(format!("--lang={lang}"));
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// A launched chromium process. Every page it opens lives in its own
/// browser context, so attempts never share cookies or storage.
#[derive(Debug)]
pub struct ChromiumBrowser {
    browser: Arc<Browser>,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    pacing: HumanPacing,
}

impl ChromiumBrowser {
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Closes the browser once no page holds it any more, then removes the
    /// launch profile.
    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "shutting down chromium");
        let handler = self.handler_task.take();
        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                if let Err(err) = browser.close().await {
                    warn!(error = %err, "failed to close browser gracefully");
                }
                if let Some(handle) = handler {
                    if let Err(err) = handle.await {
                        warn!(error = %err, "browser handler join error");
                    }
                }
            }
            Err(_) => {
                warn!(profile = %self.profile.id(), "pages still open at shutdown");
                if let Some(handle) = handler {
                    handle.abort();
                }
            }
        }
        self.profile.remove()
    }
}

#[async_trait]
impl BrowserContextFactory for ChromiumBrowser {
    async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(err) => {
                dispose_context(&self.browser, context).await;
                return Err(err.into());
            }
        };
        debug!(profile = %self.profile.id(), "isolated page opened");
        Ok(Box::new(ChromiumPage {
            page,
            context,
            browser: Arc::clone(&self.browser),
            pacing: self.pacing.clone(),
        }))
    }
}

async fn dispose_context(browser: &Browser, context: BrowserContextId) {
    if let Err(err) = browser
        .execute(DisposeBrowserContextParams::new(context))
        .await
    {
        warn!(error = %err, "failed to dispose browser context");
    }
}

pub struct ChromiumPage {
    page: Page,
    context: BrowserContextId,
    browser: Arc<Browser>,
    pacing: HumanPacing,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<PageElement>> {
        match self.page.find_elements(selector).await {
            Ok(elements) if !elements.is_empty() => Ok(Some(PageElement::new(selector))),
            Ok(_) => Ok(None),
            Err(err) => {
                debug!(selector, error = %err, "selector lookup failed");
                Ok(None)
            }
        }
    }

    async fn fill(&self, element: &PageElement, text: &str) -> BrowserResult<()> {
        let node = self
            .page
            .find_element(element.selector.as_str())
            .await
            .map_err(|_| BrowserError::ElementNotFound(element.selector.clone()))?;
        node.click().await?;
        for (chunk, pause) in self.pacing.typing_plan(text) {
            node.type_str(chunk).await?;
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }
        Ok(())
    }

    async fn click(&self, element: &PageElement) -> BrowserResult<()> {
        let node = self
            .page
            .find_element(element.selector.as_str())
            .await
            .map_err(|_| BrowserError::ElementNotFound(element.selector.clone()))?;
        node.click().await?;
        Ok(())
    }

    async fn wait_for_navigation(&self) -> BrowserResult<()> {
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn page_text(&self) -> BrowserResult<String> {
        let result = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await?;
        result
            .into_value::<String>()
            .map_err(|err| BrowserError::Page(format!("page text not a string: {err}")))
    }

    async fn current_url(&self) -> BrowserResult<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn close(&self) -> BrowserResult<()> {
        if let Err(err) = self.page.clone().close().await {
            warn!(error = %err, "failed to close page");
        }
        dispose_context(&self.browser, self.context.clone()).await;
        Ok(())
    }
}
