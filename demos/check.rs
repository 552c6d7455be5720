//! Shape checker for annotated C programs.
//!
//! Run with:
//! ```bash
//! cargo run --example check -- bench/tree-p-19.c
//! cargo run --example check -- bench/graph-10.c --max-loop-shapes 16 -v
//! ```
//!
//! Write the final heap of every completed path as DOT files, then render
//! one with Graphviz:
//! ```bash
//! cargo run --example check -- bench/list-push.c --dot dot_output
//! dot -Tsvg dot_output/path0.dot -o path0.svg
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use shape_rs::checker::{check_program, CheckerConfig};
use shape_rs::parser::parse_program;

#[derive(Debug, Parser)]
#[command(author, version, about = "Check heap shapes of an annotated C program")]
struct Cli {
    /// Source file to check
    file: PathBuf,

    /// Maximum number of explored paths
    #[arg(long, default_value = "10000")]
    max_paths: usize,

    /// Maximum number of new shapes a path may record per loop head
    #[arg(long, default_value = "256")]
    max_loop_shapes: usize,

    /// End paths on failed `check_inductive`
    #[arg(long)]
    prune: bool,

    /// Print the control flow graph
    #[arg(long)]
    cfg: bool,

    /// Directory for DOT files of the final heaps
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    simplelog::TermLogger::init(
        if cli.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let source = fs::read_to_string(&cli.file)?;
    let program = parse_program(&source)?;
    println!("structs: {}", program.structs.len());

    if cli.cfg {
        let cfg = shape_rs::cfg::ControlFlowGraph::from_program(&program);
        println!("{}", cfg);
    }

    let config = CheckerConfig {
        max_paths: cli.max_paths,
        max_loop_shapes: cli.max_loop_shapes,
        prune_on_failed_check: cli.prune,
        record_heaps: cli.dot.is_some(),
    };

    let time_check = Instant::now();
    let report = check_program(&program, &config);
    let time_check = time_check.elapsed();

    println!("{}", report);
    println!("Checked {} in {:.3} s", cli.file.display(), time_check.as_secs_f64());

    if let Some(output_dir) = &cli.dot {
        fs::create_dir_all(output_dir)?;
        for (path, dot) in &report.heaps {
            fs::write(output_dir.join(format!("path{}.dot", path)), dot)?;
        }
        println!("Wrote {} heap(s) to {}", report.heaps.len(), output_dir.display());
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
