use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use vendorsync::commands::{
    self, RegenOptions, VendorOptions,
    config::{ConfigOverrides, VcsKind},
};

/// vendorsync - keep third-party code in a monorepo in line with its manifests
///
/// Every MANIFEST under third_party declares packages; every vendored
/// package carries a METADATA file recording what was fetched. vendorsync
/// plans and performs the adds, updates, deletes and label rewrites that
/// reconcile the two, mirroring each change into version control.
///
/// Examples:
///   vendorsync vendor --dry-run     # Print what would change
///   vendorsync regen org_golang_x_text --clean
#[derive(Parser, Debug)]
#[command(author, version = env!("VENDORSYNC_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Monorepo root (defaults to the nearest directory holding a MONOREPO file)
    #[arg(
        long = "root",
        short = 'r',
        env = "VENDORSYNC_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Version control backend
    #[arg(long, value_enum, env = "VENDORSYNC_VCS", global = true)]
    pub vcs: Option<VcsKind>,

    /// Go binary used to download modules
    #[arg(long, env = "VENDORSYNC_GO", value_name = "PATH", global = true)]
    pub go: Option<PathBuf>,

    /// Gazelle binary used to generate build files
    #[arg(long, env = "VENDORSYNC_GAZELLE", value_name = "PATH", global = true)]
    pub gazelle: Option<PathBuf>,

    /// License database
    #[arg(long, env = "VENDORSYNC_LICENSE_DB", value_name = "PATH", global = true)]
    pub license_db: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Add, update and delete vendored packages to match the manifests
    Vendor(VendorArgs),

    /// Regenerate build files of vendored Go packages
    Regen(RegenArgs),

    /// Report which vendored packages have gazelle-generated build files
    Analyse(AnalyseArgs),
}

#[derive(clap::Args, Debug)]
pub struct VendorArgs {
    /// Also rewrite external references of packages that are up to date
    #[arg(long)]
    pub update_labels: bool,

    /// Print the plan without performing it
    #[arg(long)]
    pub dry_run: bool,

    /// Open the diff of every opened file carrying a divergence marker
    #[arg(long)]
    pub diff_divergences: bool,
}

#[derive(clap::Args, Debug)]
pub struct RegenArgs {
    /// Only regenerate this package
    #[arg(value_name = "PACKAGE")]
    pub package: Option<String>,

    /// Delete existing build files before generating
    #[arg(long)]
    pub clean: bool,

    /// Print the plan without performing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct AnalyseArgs {
    /// Leave non-Go packages out of the report
    #[arg(long)]
    pub omit_non_go: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.root.clone(),
            vcs: self.vcs,
            go: self.go.clone(),
            gazelle: self.gazelle.clone(),
            license_db: self.license_db.clone(),
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    let runtime = Arc::new(vendorsync::runtime::RealRuntime);
    let overrides = cli.overrides();

    match cli.command {
        Commands::Vendor(args) => {
            let options = VendorOptions {
                update_labels: args.update_labels,
                dry_run: args.dry_run,
                diff_divergences: args.diff_divergences,
            };
            commands::vendor(runtime, options, overrides).await?
        }
        Commands::Regen(args) => {
            let options = RegenOptions {
                package: args.package,
                clean: args.clean,
                dry_run: args.dry_run,
            };
            commands::regen(runtime, options, overrides).await?
        }
        Commands::Analyse(args) => commands::analyse(runtime.as_ref(), args.omit_non_go, overrides)?,
    }
    Ok(())
}
