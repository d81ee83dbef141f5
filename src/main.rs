use anyhow::{bail, Context};
use ipsv_installer::config::{Settings, SiteDefinition};
use ipsv_installer::database::connection::MySqlExecutor;
use ipsv_installer::database::provisioning::DatabaseProvisioner;
use ipsv_installer::installation::progress::{LogProgress, ProgressReporter, TerminalProgress};
use ipsv_installer::installation::registry::DriverRegistry;
use ipsv_installer::models::credentials::{ConfiguredAdmin, DialoguerPrompt};
use ipsv_installer::models::state::InstallSession;
use ipsv_installer::remote::extractor::SelectorSet;
use ipsv_installer::remote::login::{has_saved_login, Login};
use ipsv_installer::remote::releases::ReleaseManager;
use ipsv_installer::remote::HttpSession;
use ipsv_installer::{init_logging, run_wizard, WizardContext};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "\
Usage: ipsv-install [--config <file>] [--site <file>] [--download] [--no-cache] [--verbose]

  --config <file>  settings file (TOML); IPSV__SECTION__KEY variables override it
  --site <file>    site definition (TOML) to run the installation wizard for
  --download       fetch the latest release archive from the client area
  --no-cache       download even when the archive is already cached
  --verbose        mirror the log to stdout";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    site: Option<PathBuf>,
    download: bool,
    no_cache: bool,
    verbose: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--site" => args.site = Some(iter.next().context("--site needs a path")?.into()),
            "--download" => args.download = true,
            "--no-cache" => args.no_cache = true,
            "--verbose" | "-v" => args.verbose = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
        }
    }
    if args.site.is_none() && !args.download {
        bail!("nothing to do\n\n{}", USAGE);
    }
    Ok(args)
}

fn progress_reporter(settings: &Settings) -> Box<dyn ProgressReporter> {
    if std::io::stdout().is_terminal() {
        Box::new(TerminalProgress::new(settings.progress.max_width))
    } else {
        Box::new(LogProgress::default())
    }
}

/// Log in to the client area unless a remembered login is already in the session.
async fn ensure_login(session: &mut HttpSession, settings: &Settings) -> anyhow::Result<()> {
    if has_saved_login(&*session)? {
        log::info!("[PHASE: session] [STEP: login] Using saved client area login");
        return Ok(());
    }
    let interactive = std::io::stdin().is_terminal();
    let username = match settings.client_area.username.clone() {
        Some(u) if !u.trim().is_empty() => u,
        _ if interactive => dialoguer::Input::<String>::new()
            .with_prompt("Client area email")
            .interact_text()?,
        _ => bail!("client_area.username is not configured"),
    };
    let password = match settings.client_area.password.clone() {
        Some(p) if !p.is_empty() => p,
        _ if interactive => dialoguer::Password::new()
            .with_prompt("Client area password")
            .interact()?,
        _ => bail!("client_area.password is not configured"),
    };
    Login::new(username, password)
        .remember(settings.client_area.remember)
        .process(session)
        .await?;
    Ok(())
}

async fn download_latest(
    session: &mut HttpSession,
    settings: &Settings,
    use_cache: bool,
) -> anyhow::Result<()> {
    let license_url = settings
        .license
        .url
        .clone()
        .context("license.url must point at the client area license page to download releases")?;
    ensure_login(session, settings).await?;

    let mut releases = ReleaseManager::scan(settings.paths.versions_dir()?)?;
    let version = releases.fetch_latest(session, &license_url).await?;
    let mut progress = progress_reporter(settings);
    let path = releases
        .archive(session, &version, use_cache, progress.as_mut())
        .await?;
    println!("IPS {} archive: {}", version, path.display());
    Ok(())
}

async fn install_site(
    session: &mut HttpSession,
    settings: &Settings,
    site_file: &Path,
) -> anyhow::Result<()> {
    let site = SiteDefinition::load(site_file)?.into_site(settings.license.key.as_deref())?;

    let executor = MySqlExecutor::connect(&settings.database.url, settings.database.connect_timeout())
        .await?;
    let provisioner = DatabaseProvisioner::new(executor, settings.database.provisioning_options());

    let mut admin = ConfiguredAdmin::new(settings.admin.clone());
    if std::io::stdin().is_terminal() {
        admin = admin.with_prompt(Box::new(DialoguerPrompt));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[PHASE: wizard] [STEP: cancel] Interrupt received, stopping at the next step");
            on_interrupt.cancel();
        }
    });

    let options = settings.wizard_options();
    let mut progress = progress_reporter(settings);
    let ctx = WizardContext {
        browser: session,
        provisioner: &provisioner,
        credentials: &admin,
        progress: progress.as_mut(),
        session: InstallSession::new(site),
        options: &options,
        cancel,
    };

    match run_wizard(&DriverRegistry::builtin(), ctx).await {
        Ok(summary) => {
            println!("{}", summary.heading);
            if let Some(text) = &summary.text {
                println!("{}", text);
            }
            if let Some(url) = &summary.suite_url {
                println!("Suite: {}", url);
            }
            if let Some(db) = &summary.database {
                println!("Database: {} (user {} on {})", db.name, db.user, db.host);
            }
            Ok(())
        }
        Err(e) => {
            if e.leaves_remote_indeterminate() {
                eprintln!(
                    "WARNING: the remote installation may be half finished; check the site before retrying."
                );
            }
            Err(e.into())
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let settings = Settings::load(args.config.as_deref())?;
    init_logging(&settings.paths.log_dir()?, args.verbose)?;

    let mut session = HttpSession::new(
        &settings.http,
        SelectorSet::default(),
        Some(settings.paths.session_file()?),
    )?;

    if args.download {
        download_latest(&mut session, &settings, !args.no_cache).await?;
    }
    if let Some(site_file) = &args.site {
        install_site(&mut session, &settings, site_file).await?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[PHASE: shutdown] {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
