mod cli;

use tamperscope::{
    analysis::FileAnalysis,
    batch, config, extract,
    report::{self, FileReport},
    tools,
    verify::{self, FfmpegVerifier, FrameVerifier},
};
use tamperscope_media::mp4::BoxReader;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tamperscope=trace,tamperscope_forensics=trace,tamperscope_media=trace,tamperscope_probe=trace".to_string()
        } else {
            "tamperscope=warn,tamperscope_forensics=warn,tamperscope_media=warn,tamperscope_probe=warn"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            paths,
            json,
            output,
            jobs,
            extract_dir,
            verify,
        } => analyze(
            &paths,
            cli.config.as_deref(),
            AnalyzeArgs {
                json,
                output,
                jobs,
                extract_dir,
                verify,
            },
        ),
        Commands::Boxes { file, json } => dump_boxes(&file, json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tamperscope {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct AnalyzeArgs {
    json: bool,
    output: Option<PathBuf>,
    jobs: Option<usize>,
    extract_dir: Option<PathBuf>,
    verify: bool,
}

fn analyze(paths: &[PathBuf], config_path: Option<&Path>, args: AnalyzeArgs) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let options = config.forensic_options();

    let files = batch::discover_files(paths, &config.batch.extensions);
    if files.is_empty() {
        anyhow::bail!("No files to analyze in {:?}", paths);
    }

    let jobs = args.jobs.unwrap_or_else(|| config.batch.worker_count());
    let mut results = batch::analyze_batch(&files, &options, jobs)?;

    if args.verify || config.verify.enabled {
        verify_frames(&mut results, &config.verify)?;
    }

    if let Some(dir) = &args.extract_dir {
        for analysis in &mut results {
            match extract::write_frames(dir, &analysis.report.path, &analysis.streams) {
                Ok(written) => analysis.report.extracted = written,
                Err(e) => analysis.report.errors.push(format!("{:#}", e)),
            }
        }
    }

    let reports: Vec<FileReport> = results.into_iter().map(|a| a.report).collect();
    let text = if args.json {
        let mut text = if config.output.pretty {
            serde_json::to_string_pretty(&reports)?
        } else {
            serde_json::to_string(&reports)?
        };
        text.push('\n');
        text
    } else {
        reports
            .iter()
            .map(report::render_summary)
            .collect::<Vec<_>>()
            .join("\n")
    };

    match &args.output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write output: {:?}", path))?,
        None => print!("{}", text),
    }

    Ok(())
}

fn verify_frames(results: &mut [FileAnalysis], verify_config: &config::VerifyConfig) -> Result<()> {
    let verifier = FfmpegVerifier::from_config(verify_config);
    if !verifier.is_available() {
        tracing::warn!("ffmpeg not found; recovered frames cannot be verified");
    }
    let verifier: Arc<dyn FrameVerifier> = Arc::new(verifier);

    let rt = tokio::runtime::Runtime::new()?;
    for analysis in results.iter_mut() {
        if analysis.streams.is_empty() {
            continue;
        }
        let verdicts = rt.block_on(verify::verify_streams(
            Arc::clone(&verifier),
            analysis.streams.clone(),
            verify_config.concurrency,
        ));
        verify::apply_verification(&mut analysis.report.recovery, &verdicts);
        analysis.report.verification = verdicts;
    }
    Ok(())
}

fn dump_boxes(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let source = std::fs::File::open(file).with_context(|| format!("Failed to open {:?}", file))?;
    let mut reader = BoxReader::from_seekable(std::io::BufReader::new(source))?;
    let tree = reader.read_tree()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print!("{}", report::render_tree(&tree));
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = tools::check_all(&config.verify);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All optional tools are available!");
    } else {
        println!("Some tools are missing. Frame verification will report them as unavailable.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let toggles = &config.checks;
    println!(
        "  Checks: trim={} crop={} rotate={}",
        toggles.trim, toggles.crop, toggles.rotate
    );
    println!("  Editor signatures: {}", toggles.editor_signatures.len());
    println!("  Sync samples per track: {}", config.sampling.max_sync_samples);
    println!(
        "  Recovery: enabled={} scan limit={} bytes",
        config.recovery.enabled, config.recovery.max_gap_bytes
    );
    println!(
        "  Verification: enabled={} timeout={}s",
        config.verify.enabled, config.verify.timeout_secs
    );
    println!("  Workers: {}", config.batch.worker_count());

    Ok(())
}
