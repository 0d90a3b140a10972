//! `plinth`: compile and run resolved trees from the command line.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use plinth_cli::colors::{gray, red, status_label, yellow};
use plinth_cli::config::PlinthConfig;
use plinth_cli::error::Result;
use plinth_cli::{
    compile_tree, init, init_logging, load_tree, render_module, render_stats, run_module,
};

#[derive(Parser)]
#[command(name = "plinth", version, about = "Plinth baseline code generator and simulator")]
struct Cli {
    /// Use this config file instead of searching for plinth.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JSON tree and list the generated code
    Compile {
        /// Path to the tree
        file: PathBuf,

        /// Print function headers only
        #[arg(long)]
        summary: bool,

        /// Write the compiled module as JSON instead of a listing
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        compile: CompileFlags,
    },
    /// Compile a JSON tree and run its main function
    Run {
        /// Path to the tree
        file: PathBuf,

        /// Print simulator counters after the result
        #[arg(long)]
        stats: bool,

        /// Abort after this many instructions (0 for no limit)
        #[arg(long)]
        max_steps: Option<u64>,

        /// Scramble caller-saved registers after every stub and runtime call
        #[arg(long)]
        clobber: bool,

        #[command(flatten)]
        compile: CompileFlags,
    },
    /// Create plinth.toml and an example tree in the current directory
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct CompileFlags {
    /// Fail on unsupported constructs instead of emitting a trap
    #[arg(long)]
    strict: bool,

    /// Tree nesting depth at which a function gets no code
    #[arg(long)]
    max_depth: Option<usize>,
}

impl CompileFlags {
    fn apply(&self, config: &mut PlinthConfig) {
        if self.strict {
            config.compile.strict_unsupported = true;
        }
        if let Some(depth) = self.max_depth {
            config.compile.max_depth = depth;
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<PlinthConfig> {
    if let Some(path) = explicit {
        return PlinthConfig::load_from(path);
    }
    let (path, config) = PlinthConfig::discover()?;
    if let Some(path) = path {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    Ok(config)
}

fn cmd_compile(config: &PlinthConfig, file: &Path, summary: bool, json: bool) -> Result<()> {
    let tree = load_tree(file)?;
    let module = compile_tree(&tree, &config.compile)?;
    if json {
        let text = serde_json::to_string_pretty(&module)
            .map_err(|e| plinth_cli::error::CliError::Serialize(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }
    print!("{}", render_module(&module, !summary));
    for failed in module.failed() {
        eprintln!("{} no code generated for {}", yellow("warning:"), failed.name);
    }
    Ok(())
}

fn cmd_run(config: &PlinthConfig, file: &Path, stats: bool) -> Result<()> {
    let tree = load_tree(file)?;
    let module = compile_tree(&tree, &config.compile)?;
    let report = run_module(&module, config.vm.clone())?;
    for line in &report.output {
        println!("{line}");
    }
    println!("{} {}", gray("=>"), report.value);
    if stats {
        eprint!("{}", render_stats(&report.stats));
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let dir = std::env::current_dir().map_err(|source| plinth_cli::error::CliError::Read {
        path: PathBuf::from("."),
        source,
    })?;
    for path in init(&dir, force)? {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        println!("{} {name}", status_label("Created"));
    }
    Ok(())
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Compile {
            file,
            summary,
            json,
            compile,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            compile.apply(&mut config);
            cmd_compile(&config, &file, summary, json)
        }
        Commands::Run {
            file,
            stats,
            max_steps,
            clobber,
            compile,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            compile.apply(&mut config);
            if let Some(steps) = max_steps {
                config.vm.max_steps = steps;
            }
            if clobber {
                config.vm.clobber_caller_saved = true;
            }
            cmd_run(&config, &file, stats)
        }
        Commands::Init { force } => cmd_init(force),
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli) {
        eprintln!("{} {e}", red("error:"));
        std::process::exit(1);
    }
}
