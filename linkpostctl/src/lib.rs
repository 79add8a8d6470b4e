pub mod commands;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use linkpost_core::browser::{
    BrowserContextFactory, BrowserError, BrowserLauncher, ChromiumBrowser, HumanPacing,
    ProfileManager,
};
use linkpost_core::content::ContentGenerator;
use linkpost_core::discovery::{BrowserProbe, DiscoveryEngine, DiscoveryError, DiscoveryStats};
use linkpost_core::posting::{FsEvidenceStore, PostingActor};
use linkpost_core::registry::{
    Platform, PlatformRegistry, RegistryError, RegistryStats, SqlitePlatformStore,
};
use linkpost_core::session::{
    Campaign, PostingAttempt, Session, SessionError, SessionTracker, SqliteSessionStore,
};
use linkpost_core::{
    load_pipeline_config, ConfigError, Pipeline, PipelineConfig, PipelineError, PlatformGate,
    SessionRunner,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use commands::campaign::CampaignCommands;
use commands::platform::{ImportSummary, PlatformCommands, PlatformList, PlatformListArgs};
use commands::session::SessionCommands;
use commands::{CampaignCreateArgs, DiscoverArgs, SessionRunArgs};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Backlink publishing pipeline control", long_about = None)]
pub struct Cli {
    /// Pipeline configuration file
    #[arg(long, default_value = "configs/linkpost.toml")]
    pub config: PathBuf,
    /// Override for the SQLite database (replaces paths.database)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and manage the platform registry
    #[command(subcommand)]
    Platform(PlatformCommands),
    /// Create and inspect campaigns
    #[command(subcommand)]
    Campaign(CampaignCommands),
    /// Run and inspect posting sessions
    #[command(subcommand)]
    Session(SessionCommands),
    /// Grow the registry from the configured sources
    Discover(DiscoverArgs),
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "linkpostctl", &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Platform(command) => match command {
            PlatformCommands::List(args) => render(&context.platform_list(args)?, cli.format)?,
            PlatformCommands::Show { key } => render(&context.registry.get(key)?, cli.format)?,
            PlatformCommands::Import { file } => {
                render(&context.platform_import(file)?, cli.format)?
            }
            PlatformCommands::Deactivate { key } => {
                render(&context.registry.deactivate(key).await?, cli.format)?
            }
            PlatformCommands::Reactivate { key } => {
                render(&context.registry.reactivate(key).await?, cli.format)?
            }
            PlatformCommands::Stats => render(&context.stats()?, cli.format)?,
        },
        Commands::Campaign(command) => match command {
            CampaignCommands::Create(args) => {
                render(&context.campaign_create(args)?, cli.format)?
            }
            CampaignCommands::Show { campaign_id } => {
                render(&context.tracker.campaign(campaign_id)?, cli.format)?
            }
            CampaignCommands::List => {
                render(&context.tracker.store().list_campaigns()?, cli.format)?
            }
        },
        Commands::Session(command) => match command {
            SessionCommands::Run(args) => render(&context.session_run(args).await?, cli.format)?,
            SessionCommands::Show { session_id } => {
                render(&context.tracker.get(session_id)?, cli.format)?
            }
            SessionCommands::Attempts { session_id } => {
                render(&context.attempts(session_id)?, cli.format)?
            }
            SessionCommands::List { campaign } => {
                render(&context.tracker.list(campaign.as_deref())?, cli.format)?
            }
        },
        Commands::Discover(args) => render(&context.discover(args).await?, cli.format)?,
        Commands::Completions { .. } => {}
    }
    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => println!("{}", value.display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

pub(crate) trait DisplayFallback {
    fn display(&self) -> String;
}

pub(crate) fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Stores opened once per invocation; browser-backed services are built on
/// demand by the commands that need them.
pub struct AppContext {
    config: PipelineConfig,
    database: PathBuf,
    registry: Arc<PlatformRegistry>,
    tracker: SessionTracker,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = load_pipeline_config(&cli.config)?;
        Self::from_config(config, cli.db.clone())
    }

    pub fn from_config(config: PipelineConfig, database: Option<PathBuf>) -> Result<Self> {
        let database = database.unwrap_or_else(|| config.database_path());
        if let Some(parent) = database.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let platforms = SqlitePlatformStore::new(&database)?;
        platforms.initialize()?;
        let sessions = SqliteSessionStore::new(&database)?;
        sessions.initialize()?;

        Ok(Self {
            registry: Arc::new(PlatformRegistry::new(platforms, config.registry.clone())),
            tracker: SessionTracker::new(sessions),
            database,
            config,
        })
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn platform_list(&self, args: &PlatformListArgs) -> Result<PlatformList> {
        let rows: Vec<Platform> = self.registry.list(&args.filter())?;
        Ok(PlatformList { rows })
    }

    pub fn platform_import(&self, file: &Path) -> Result<ImportSummary> {
        let candidates = linkpost_core::discovery::load_seed_file(file)?;
        let inserted = self.registry.import_seed(&candidates)?;
        Ok(ImportSummary {
            file: file.display().to_string(),
            records: candidates.len(),
            inserted,
        })
    }

    pub fn campaign_create(&self, args: &CampaignCreateArgs) -> Result<Campaign> {
        Ok(self.tracker.create_campaign(&args.to_campaign())?)
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        Ok(self.registry.stats()?)
    }

    pub fn attempts(&self, session_id: &str) -> Result<Vec<PostingAttempt>> {
        Ok(self.tracker.attempts(session_id)?)
    }

    /// Starts a session on a fresh browser, waits for it and returns the
    /// final snapshot. Ctrl-C stops the session instead of aborting it.
    pub async fn session_run(&self, args: &SessionRunArgs) -> Result<Session> {
        let campaign = self.tracker.campaign(&args.campaign)?;

        let browser = Arc::new(self.launcher()?.launch().await?);
        let factory: Arc<dyn BrowserContextFactory> = Arc::clone(&browser) as _;
        let pipeline = Arc::new(self.pipeline(factory));

        let session_id = match pipeline.start_session(&campaign.campaign_id, args.criteria()) {
            Ok(id) => id,
            Err(err) => {
                drop(pipeline);
                close_browser(browser).await;
                return Err(err.into());
            }
        };
        eprintln!("session {session_id} started");

        let interrupt = {
            let pipeline = Arc::clone(&pipeline);
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(session = %session_id, "interrupt received, stopping session");
                    if let Err(err) = pipeline.stop(&session_id) {
                        warn!(session = %session_id, error = %err, "stop request failed");
                    }
                }
            })
        };

        let outcome = pipeline.wait(&session_id).await;
        interrupt.abort();
        let _ = interrupt.await;
        pipeline.shutdown();
        drop(pipeline);
        close_browser(browser).await;
        Ok(outcome?)
    }

    pub async fn discover(&self, args: &DiscoverArgs) -> Result<DiscoveryStats> {
        let engine =
            DiscoveryEngine::from_config(Arc::clone(&self.registry), &self.config.discovery)?
                .dry_run(args.dry_run);
        info!(
            category = %args.category,
            depth = args.depth,
            sources = ?engine.source_names(),
            "starting discovery"
        );

        if !(args.probe || self.config.discovery.probe) {
            return Ok(engine.discover(args.category, args.depth).await?);
        }

        let browser = Arc::new(self.launcher()?.launch().await?);
        let deadline = Duration::from_secs(
            self.config.actor.navigation_timeout_secs + self.config.actor.element_timeout_secs,
        );
        let probe = BrowserProbe::new(
            Arc::clone(&browser) as Arc<dyn BrowserContextFactory>,
            self.config.forms.clone(),
            deadline,
        );
        let engine = engine.with_probe(Arc::new(probe));
        let stats = engine.discover(args.category, args.depth).await;
        drop(engine);
        close_browser(browser).await;
        Ok(stats?)
    }

    fn launcher(&self) -> Result<BrowserLauncher> {
        let profiles =
            ProfileManager::from_config(&self.config.browser, &self.config.profiles_dir())?;
        Ok(BrowserLauncher::new(
            self.config.browser.clone(),
            profiles,
            HumanPacing::from_config(&self.config.actor),
        ))
    }

    fn pipeline(&self, factory: Arc<dyn BrowserContextFactory>) -> Pipeline {
        let evidence = FsEvidenceStore::new(self.config.evidence_dir());
        let actor = PostingActor::new(
            factory,
            Arc::new(evidence),
            &self.config.actor,
            &self.config.forms,
        );
        let runner = SessionRunner::new(
            Arc::clone(&self.registry),
            self.tracker.clone(),
            Arc::new(ContentGenerator::from_config(&self.config.content)),
            Arc::new(actor),
            Arc::new(PlatformGate::new()),
            self.config.session.clone(),
        );
        Pipeline::new(runner, self.config.session.max_concurrent_sessions)
    }
}

async fn close_browser(browser: Arc<ChromiumBrowser>) {
    match Arc::try_unwrap(browser) {
        Ok(browser) => {
            if let Err(err) = browser.shutdown().await {
                warn!(error = %err, "browser shutdown failed");
            }
        }
        Err(_) => warn!("browser still referenced, leaving it to exit with the process"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpost_core::registry::PlatformCategory;
    use linkpost_core::session::SessionStatus;
    use tempfile::TempDir;

    fn prepare_test_context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.data_dir = temp.path().join("data").display().to_string();
        let context = AppContext::from_config(config, None).unwrap();
        (temp, context)
    }

    fn write_seed(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("seed.yaml");
        fs::write(
            &path,
            "platforms:\n  - url: https://blog.example.org/post\n    category: comment_form\n    authority_estimate: 70\n  - url: https://dir.example.net/submit\n    category: directory_listing\n    authority_estimate: 40\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn parses_global_flags_and_nested_commands() {
        let cli = Cli::try_parse_from([
            "linkpostctl",
            "--format",
            "json",
            "--db",
            "/tmp/x.sqlite",
            "platform",
            "list",
            "--category",
            "comment",
            "--inactive",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.sqlite")));
        match cli.command {
            Commands::Platform(PlatformCommands::List(args)) => {
                assert_eq!(args.category, Some(PlatformCategory::CommentForm));
                assert!(args.inactive);
                assert_eq!(args.limit, 50);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_category_and_missing_keywords() {
        assert!(Cli::try_parse_from([
            "linkpostctl",
            "discover",
            "--category",
            "forum",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "linkpostctl",
            "campaign",
            "create",
            "--url",
            "https://example.com",
            "--anchor",
            "example",
        ])
        .is_err());
    }

    #[test]
    fn session_run_leaves_categories_to_the_campaign() {
        let cli = Cli::try_parse_from([
            "linkpostctl",
            "session",
            "run",
            "--campaign",
            "cmp-1",
            "--min-authority",
            "30",
        ])
        .unwrap();
        let Commands::Session(SessionCommands::Run(args)) = cli.command else {
            panic!("expected session run");
        };
        let criteria = args.criteria();
        assert_eq!(criteria.min_authority, 30);
        assert!(criteria.categories.is_empty());
    }

    #[test]
    fn import_then_list_platforms() {
        let (temp, context) = prepare_test_context();
        let seed = write_seed(&temp);
        let summary = context.platform_import(&seed).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.inserted, 2);
        assert!(context.database().exists());

        let args = PlatformListArgs {
            category: Some(PlatformCategory::CommentForm),
            inactive: false,
            limit: 10,
        };
        let list = context.platform_list(&args).unwrap();
        assert_eq!(list.rows.len(), 1);
        assert_eq!(list.rows[0].key, "blog.example.org/post");
        assert!(list.display().contains("auth=70"));

        let again = context.platform_import(&seed).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(context.stats().unwrap().total, 2);
    }

    #[test]
    fn campaign_create_keeps_identity_and_renders() {
        let (_temp, context) = prepare_test_context();
        let cli = Cli::try_parse_from([
            "linkpostctl",
            "campaign",
            "create",
            "--url",
            "https://shop.example.com",
            "--keyword",
            "herbal tea",
            "--keyword",
            "green tea",
            "--anchor",
            "tea shop",
            "--quota",
            "3",
            "--name",
            "Ana",
        ])
        .unwrap();
        let Commands::Campaign(CampaignCommands::Create(args)) = cli.command else {
            panic!("expected campaign create");
        };
        let campaign = context.campaign_create(&args).unwrap();
        assert_eq!(campaign.total_quota, 3);
        assert_eq!(campaign.keywords.len(), 2);
        assert_eq!(
            campaign.identity.as_ref().and_then(|id| id.name.as_deref()),
            Some("Ana")
        );

        let stored = context.tracker.campaign(&campaign.campaign_id).unwrap();
        assert!(stored.display().contains("herbal tea, green tea"));
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["target_url"], "https://shop.example.com");
    }

    #[tokio::test]
    async fn deactivate_and_show_session_errors() {
        let (temp, context) = prepare_test_context();
        context.platform_import(&write_seed(&temp)).unwrap();
        let platform = context
            .registry
            .deactivate("blog.example.org/post")
            .await
            .unwrap();
        assert!(!platform.active);
        assert!(platform.display().contains("inactive"));

        let err = context.tracker.get("ses-missing").unwrap_err();
        assert!(matches!(
            AppError::from(err),
            AppError::Session(SessionError::NotFound { .. })
        ));
    }

    #[test]
    fn session_text_includes_report_lines() {
        let mut session = Session::new("cmp-1", Default::default());
        session.status = SessionStatus::Failed;
        session.error = Some("exhausted: no platforms left".into());
        let text = session.display();
        assert!(text.contains("cmp-1"));
        assert!(text.contains("error: exhausted"));
    }
}
