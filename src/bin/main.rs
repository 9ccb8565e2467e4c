use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

use classfold::bytecode::decode;
use classfold::bytecode::descriptor::method_shape;
use classfold::classfile::{ClassFile, CodeAttribute};
use classfold::{optimize_class_file, optimize_tree, Config};

#[derive(Parser)]
#[command(name = "classfold")]
#[command(about = "Constant folding and dead code removal for JVM class files")]
#[command(version)]
struct Cli {
    /// Log every fold and deletion
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PassOptions {
    /// Skip constant folding, propagation and branch pruning
    #[arg(long)]
    no_fold: bool,

    /// Skip dead-store elimination
    #[arg(long)]
    no_dead_stores: bool,

    /// Major version written for rewritten classes (45 to 50)
    #[arg(
        long,
        value_name = "VERSION",
        default_value_t = classfold::config::DEFAULT_TARGET_MAJOR_VERSION,
        value_parser = clap::value_parser!(u16).range(45..=50)
    )]
    target_version: u16,
}

impl PassOptions {
    fn config(&self) -> Config {
        Config::new()
            .with_folding(!self.no_fold)
            .with_dead_store_elimination(!self.no_dead_stores)
            .with_target_major_version(self.target_version)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize every class file under a directory
    Optimize {
        /// Input directory
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,

        /// Output directory, mirrored from the input
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Class file name to copy without optimizing (repeatable)
        #[arg(long, value_name = "NAME")]
        exclude: Vec<String>,

        #[command(flatten)]
        passes: PassOptions,
    },

    /// Optimize a single class file
    File {
        #[arg(value_name = "IN")]
        input: PathBuf,

        #[arg(value_name = "OUT")]
        output: PathBuf,

        #[command(flatten)]
        passes: PassOptions,
    },

    /// Print the decoded instructions of every method
    Dump {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    match cli.command {
        Commands::Optimize { input, output, exclude, passes } => {
            let mut config = passes.config();
            config.exclude = exclude;
            let report = optimize_tree(&input, &output, &config)
                .with_context(|| format!("optimizing {}", input.display()))?;
            println!(
                "{} optimized, {} copied, {} failed ({} methods changed)",
                report.files_optimized, report.files_copied, report.files_failed, report.methods_changed
            );
        }
        Commands::File { input, output, passes } => {
            let report = optimize_class_file(&input, &output, &passes.config())?;
            println!(
                "{}: {} of {} methods changed{}",
                input.display(),
                report.methods_changed,
                report.methods,
                report.lowered_from.map(|v| format!(", version lowered from {}", v)).unwrap_or_default()
            );
        }
        Commands::Dump { input } => dump(&input)?,
    }

    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let class = ClassFile::parse(&bytes)?;
    let pool = &class.constant_pool;
    println!("class {} (version {}.{})", class.name().unwrap_or("?"), class.major_version, class.minor_version);

    for method in &class.methods {
        let name = method.name(pool).unwrap_or("?");
        let descriptor = method.descriptor(pool).unwrap_or("?");
        let Some(code_index) = method.code_index(pool) else {
            println!("\n{}{}: no code", name, descriptor);
            continue;
        };
        let code = CodeAttribute::parse(&method.attributes[code_index].info)?;
        let parameters = method_shape(descriptor).map_or(0, |s| s.parameter_slots) + u16::from(!method.is_static());
        println!(
            "\n{}{}: max_stack {}, max_locals {}, {} parameter slot(s)",
            name, descriptor, code.max_stack, code.max_locals, parameters
        );
        match decode(&code.code, &code.exception_table, pool) {
            Ok(body) => print!("{}", body),
            Err(err) => println!("  cannot decode: {}", err),
        }
    }
    Ok(())
}
