mod config;
mod dot;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use webdetect::gen_random::{gen_rows, write_tsv};
use webdetect::{build_solution, BuildOptions, Checksum, Corpus, Database, DbId, DetectOptions, Detector, Solution};

use crate::config::ConfigLayer;
use crate::dot::generate_svg_with_dot;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log more. Pass twice for debug output. `WEBDETECT_LOG` overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML file with default options. Defaults to webdetect.toml in the working directory, if
    /// it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

/// Options for building a solution. Anything not given here comes from the config file,
/// `WEBDETECT_*` environment variables, or the built-in defaults.
#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Number of defining checksums to aim for (and store) per app-version
    #[arg(long)]
    max: Option<usize>,

    /// Drop checksums shared by more than this many applications
    #[arg(long, conflicts_with = "no_filter")]
    max_apps: Option<usize>,

    /// Keep every checksum, no matter how widely it is shared
    #[arg(long)]
    no_filter: bool,

    /// Upper bound on balancer passes
    #[arg(long)]
    iterations: Option<usize>,

    /// Keep `trunk` snapshots in merged identities
    #[arg(long)]
    keep_trunk: bool,

    /// Skip the consistency checks after peeling and balancing
    #[arg(long)]
    no_verify: bool,
}

impl BuildArgs {
    fn options(&self, file: &ConfigLayer) -> anyhow::Result<BuildOptions> {
        let mut opts = BuildOptions::default();
        file.apply_to_build(&mut opts);

        let flags = ConfigLayer {
            max_checksums: self.max,
            max_apps_per_checksum: self.max_apps,
            filter_shared: self.no_filter.then_some(false),
            balancer_iterations: self.iterations,
            exclude_trunk: self.keep_trunk.then_some(false),
            verify: self.no_verify.then_some(false),
            required_fraction: None,
        };
        flags.apply_to_build(&mut opts);
        if opts.max_checksums == 0 {
            bail!("max checksums per app-version must be at least 1");
        }
        Ok(opts)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a checksum database from a corpus TSV file
    Build {
        /// Corpus file, with rows of `app<TAB>version<TAB>sha256[<TAB>depth]`. Use - for stdin.
        corpus: OsString,

        /// Output the database to the specified filename. If missing, output is printed to stdout.
        #[arg(short, long)]
        output: Option<OsString>,

        #[command(flatten)]
        build: BuildArgs,

        /// Write the list of app-versions which couldn't be given any defining checksum here
        #[arg(long)]
        undetected: Option<PathBuf>,

        /// Use pretty JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Detect app-versions from a list of observed checksums
    Detect {
        /// Database produced by `webdetect build`
        database: PathBuf,

        /// File with one hex checksum per line. Further whitespace separated columns are ignored.
        /// Use - for stdin.
        checksums: OsString,

        /// Fraction of an app-version's stored checksums which must be observed
        #[arg(long)]
        fraction: Option<f64>,

        /// Output the full detection result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a solution and print statistics about it as JSON
    Stats {
        corpus: OsString,

        #[command(flatten)]
        build: BuildArgs,

        /// Output the result to the specified filename. If missing, output is printed to stdout.
        #[arg(short, long)]
        output: Option<OsString>,
    },

    /// Generate a diagram of the dependency graph between app-versions.
    ///
    /// By default this runs graphviz's `dot` to render an SVG.
    Dot {
        corpus: OsString,

        #[command(flatten)]
        build: BuildArgs,

        /// Save the graphviz source instead of rendering it
        #[arg(short, long)]
        no_render: bool,

        /// Output filename. If missing, output is saved next to the corpus as .svg / .dot.
        ///
        /// Use -o- to output to stdout instead.
        #[arg(short, long)]
        output: Option<OsString>,

        /// Path to `dot` command
        #[arg(long)]
        dot_path: Option<OsString>,
    },

    /// Generate a random corpus, for testing and benchmarks
    GenCorpus {
        /// RNG seed for the generated data
        #[arg(long)]
        seed: Option<u64>,

        /// Number of applications to generate
        #[arg(long)]
        apps: Option<usize>,

        /// Output the result to the specified filename. If missing, output is printed to stdout.
        #[arg(short, long)]
        output: Option<OsString>,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("WEBDETECT_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn is_stdio(path: &Option<OsString>) -> bool {
    path.as_ref().map_or(true, |p| p == "-")
}

fn open_input(path: &OsString) -> anyhow::Result<Box<dyn BufRead>> {
    Ok(if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
        Box::new(BufReader::new(file))
    })
}

fn open_output(path: Option<OsString>) -> anyhow::Result<Box<dyn Write>> {
    Ok(if is_stdio(&path) {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let path = path.unwrap_or_default();
        let file = File::create(&path).with_context(|| format!("failed to create {path:?}"))?;
        Box::new(BufWriter::new(file))
    })
}

fn write_serde_data<T: Serialize>(output: Option<OsString>, pretty: bool, val: &T) -> anyhow::Result<()> {
    let mut writer = open_output(output)?;
    if pretty {
        serde_json::to_writer_pretty(&mut writer, val)?;
    } else {
        serde_json::to_writer(&mut writer, val)?;
    }
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn solve(corpus_path: &OsString, opts: &BuildOptions) -> anyhow::Result<Solution> {
    let corpus = Corpus::read_tsv(open_input(corpus_path)?)
        .with_context(|| format!("failed to read corpus {corpus_path:?}"))?;
    info!(checksums = corpus.num_checksums(), app_versions = corpus.app_versions().len(), "corpus loaded");

    match build_solution(&corpus, opts) {
        Ok(solution) => Ok(solution),
        Err(e) => {
            if e.is_invariant_violation() {
                error!("aborting build, no database will be written: {e}");
            }
            Err(e.into())
        }
    }
}

/// Parse observed checksums, one per line. Blank lines are skipped.
fn read_observed<R: BufRead>(reader: R) -> anyhow::Result<Vec<Checksum>> {
    let mut observed = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(first) = line.split_whitespace().next() else { continue; };
        let checksum = first.parse::<Checksum>()
            .with_context(|| format!("line {}", i + 1))?;
        observed.push(checksum);
    }
    Ok(observed)
}

#[derive(Debug, Serialize)]
struct NamedDetection {
    detected: Vec<String>,
    implied: Vec<String>,
    filtered_by_fraction: Vec<String>,
    filtered_by_depends_on: Vec<String>,
    potentially_missed_implied: Vec<String>,
}

fn names(db: &Database, ids: &[DbId]) -> Vec<String> {
    ids.iter().map(|&id| db.name(id)).collect()
}

fn default_dot_output(corpus: &OsString, render: bool) -> OsString {
    let ext = if render { "svg" } else { "dot" };
    if corpus == "-" {
        return format!("deps.{ext}").into();
    }
    Path::new(corpus).with_extension(ext).into_os_string()
}

fn main() -> anyhow::Result<()> {
    let cli: Cli = Cli::parse();
    init_logging(cli.verbose);
    let file_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { corpus, output, build, undetected, pretty } => {
            let opts = build.options(&file_config)?;
            let solution = solve(&corpus, &opts)?;
            let db = solution.database();
            write_serde_data(output, pretty, &db)?;

            let stats = solution.stats();
            if let Some(path) = undetected {
                fs::write(&path, stats.undetected_report())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            eprint!("{stats}");
        }

        Commands::Detect { database, checksums, fraction, json } => {
            let file = File::open(&database)
                .with_context(|| format!("failed to open {}", database.display()))?;
            let db: Database = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("{} is not a webdetect database", database.display()))?;

            let mut opts = DetectOptions::default();
            file_config.apply_to_detect(&mut opts);
            if let Some(fraction) = fraction { opts.required_fraction = fraction; }
            if !(0.0..=1.0).contains(&opts.required_fraction) {
                bail!("fraction must be between 0 and 1, got {}", opts.required_fraction);
            }

            let observed = read_observed(open_input(&checksums)?)?;
            let d = Detector::new(&db, opts).detect(&observed);
            info!(observed = observed.len(), detected = d.detected.len(), implied = d.implied.len(), "detection done");

            if json {
                let named = NamedDetection {
                    detected: names(&db, &d.detected),
                    implied: names(&db, &d.implied),
                    filtered_by_fraction: names(&db, &d.filtered_by_fraction),
                    filtered_by_depends_on: names(&db, &d.filtered_by_depends_on),
                    potentially_missed_implied: names(&db, &d.potentially_missed_implied),
                };
                write_serde_data(None, true, &named)?;
            } else {
                for id in d.detected.iter() {
                    println!("{}", db.name(*id));
                }
                for id in d.implied.iter() {
                    println!("{} (implied)", db.name(*id));
                }
            }
        }

        Commands::Stats { corpus, build, output } => {
            let opts = build.options(&file_config)?;
            let stats = solve(&corpus, &opts)?.stats();
            write_serde_data(output, true, &stats)?;
        }

        Commands::Dot { corpus, build, no_render, output, dot_path } => {
            let opts = build.options(&file_config)?;
            let solution = solve(&corpus, &opts)?;
            let dot_source = solution.graph().to_dot_graph();

            let content = if no_render {
                dot_source
            } else {
                generate_svg_with_dot(dot_source, dot_path)?
            };

            let output = output.unwrap_or_else(|| default_dot_output(&corpus, !no_render));
            let mut writer = open_output(Some(output))?;
            writer.write_all(content.as_bytes())?;
            writer.flush()?;
        }

        Commands::GenCorpus { seed, apps, output } => {
            let rows = gen_rows(seed.unwrap_or(0), apps.unwrap_or(100));
            write_tsv(&rows, open_output(output)?)?;
        }
    }

    Ok(())
}
