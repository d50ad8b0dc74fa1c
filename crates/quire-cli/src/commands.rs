use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};

use anyhow::{bail, Context};
use colored::Colorize;
use quire_lexicon::{Catalog, ValidateFlags};
use quire_repo::{CompactionMode, RepoConfig, RepoService};
use quire_types::{Did, Tid};
use serde_json::json;
use tracing::debug;

use crate::cli::*;
use crate::samples::{check_samples, record_types};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::ValidateLexicon(args) => cmd_validate_lexicon(&cli, args),
        Command::Inspect(args) => cmd_inspect(&cli, args),
        Command::Export(args) => cmd_export(&cli, args),
        Command::Import(args) => cmd_import(&cli, args),
        Command::Compact(args) => cmd_compact(&cli, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RepoConfig> {
    let mut config = match &cli.config {
        Some(path) => RepoConfig::from_file(path)?,
        None => RepoConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    debug!(data_dir = %config.data_dir.display(), "configuration loaded");
    Ok(config)
}

fn open_service(cli: &Cli) -> anyhow::Result<RepoService> {
    let config = load_config(cli)?;
    let data_dir = config.data_dir.clone();
    RepoService::open(config).with_context(|| format!("opening repositories in {}", data_dir.display()))
}

fn parse_did(raw: &str) -> anyhow::Result<Did> {
    Did::new(raw).with_context(|| format!("invalid DID {raw:?}"))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_validate_lexicon(cli: &Cli, args: &ValidateLexiconArgs) -> anyhow::Result<()> {
    if !args.path.is_dir() {
        bail!("schema path does not exist: {}", args.path.display());
    }
    println!("Loading schemas from {}", args.path.display().to_string().bold());
    let catalog = Catalog::load_dir(&args.path)?;
    if cli.verbose {
        for id in catalog.ids() {
            println!("  {} {}", "✓".green(), id);
        }
    }
    println!("{} Loaded {} schemas", "✓".green().bold(), catalog.len());

    let broken = catalog.check_references();
    if !broken.is_empty() {
        println!("{} Unresolved references:", "✗".red().bold());
        for e in &broken {
            println!("  {e}");
        }
        bail!("{} reference errors", broken.len());
    }
    println!("{} All references resolve", "✓".green().bold());

    if args.schemas_only {
        println!("Skipping test data (--schemas-only)");
        return Ok(());
    }
    let test_data = args
        .test_data
        .clone()
        .unwrap_or_else(|| args.path.join("test-data"));
    let flags = if args.strict {
        ValidateFlags::STRICT
    } else {
        ValidateFlags::LENIENT
    };
    println!("\nValidating test data from {}", test_data.display().to_string().bold());
    let report = check_samples(&catalog, &test_data, flags)?;

    if cli.verbose {
        for outcome in &report.outcomes {
            let mark = if outcome.as_expected() {
                "✓".green()
            } else {
                "✗".red()
            };
            let expectation = if outcome.expect_invalid { " (expect rejection)" } else { "" };
            println!("  {mark} {}{}", outcome.path.display(), expectation.dimmed());
            if let Some(reason) = &outcome.rejection {
                println!("      {}", reason.dimmed());
            }
        }
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("\n{} Test data errors:", "✗".red().bold());
        for outcome in &failures {
            match &outcome.rejection {
                Some(reason) => println!("  {}: {}", outcome.path.display(), reason),
                None => println!(
                    "  {}: passed validation but is marked invalid",
                    outcome.path.display()
                ),
            }
        }
        bail!("{} test data errors", failures.len());
    }

    if report.outcomes.is_empty() {
        println!("  {} No test data files found", "!".yellow());
        return Ok(());
    }
    println!(
        "  Valid samples:   {}/{} passed",
        report.valid_passed(),
        report.valid_total()
    );
    println!(
        "  Invalid samples: {}/{} rejected",
        report.invalid_rejected(),
        report.invalid_total()
    );

    let tested = report.tested_types();
    let records = record_types(&catalog);
    let untested: Vec<&str> = records.iter().copied().filter(|id| !tested.contains(id)).collect();
    println!(
        "\nRecord types with test data: {}/{}",
        records.len() - untested.len(),
        records.len()
    );
    for id in untested {
        println!("  {} {}", "-".yellow(), id);
    }
    println!("\n{} All validations passed", "✓".green().bold());
    Ok(())
}

fn cmd_inspect(cli: &Cli, args: &InspectArgs) -> anyhow::Result<()> {
    let service = open_service(cli)?;
    let did = parse_did(&args.did)?;
    let info = service.get_repository(&did)?;
    let commits = service.list_commits(&did, args.limit, None)?;
    let verified = if args.verify {
        Some(service.verify_repository(&did, &service.context())?)
    } else {
        None
    };

    if cli.format == OutputFormat::Json {
        return print_json(&json!({
            "did": info.did,
            "shard": info.shard,
            "head": info.head.as_ref().map(|h| json!({
                "commit": h.commit.to_hex(),
                "data": h.data.to_hex(),
                "version": h.version,
                "rev": h.rev.to_string(),
            })),
            "records": info.record_count,
            "blocks": info.stats.blocks,
            "bytes": info.stats.bytes,
            "commits": commits.commits.iter().map(|c| json!({
                "id": c.id.to_hex(),
                "version": c.commit.version(),
                "rev": c.commit.rev().to_string(),
                "data": c.commit.data().to_hex(),
            })).collect::<Vec<_>>(),
            "verified_commits": verified,
        }));
    }

    println!("Repository {} (shard {})", info.did.to_string().bold(), info.shard);
    match &info.head {
        Some(head) => println!(
            "  Head: {} v{} rev {}",
            head.commit.short_hex().yellow(),
            head.version,
            head.rev.to_string().cyan()
        ),
        None => println!("  Head: {}", "none".dimmed()),
    }
    println!("  Records: {}", info.record_count);
    println!("  Blocks: {} ({} bytes)", info.stats.blocks, info.stats.bytes);
    if !commits.commits.is_empty() {
        println!("  Commits:");
        for c in &commits.commits {
            println!(
                "    {} v{} rev {} tree {}",
                c.id.short_hex().yellow(),
                c.commit.version(),
                c.commit.rev(),
                c.commit.data().short_hex().dimmed()
            );
        }
    }
    if let Some(count) = verified {
        println!("{} Verified {} commits and the head tree", "✓".green().bold(), count);
    }
    Ok(())
}

fn cmd_export(cli: &Cli, args: &ExportArgs) -> anyhow::Result<()> {
    let service = open_service(cli)?;
    let did = parse_did(&args.did)?;
    let since = args
        .since
        .as_deref()
        .map(Tid::parse)
        .transpose()
        .context("invalid --since revision")?;
    let ctx = service.context();

    let summary = match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            service.export_to(&did, since, BufWriter::new(file), &ctx)?
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let summary = service.export_to(&did, since, &mut out, &ctx)?;
            out.flush()?;
            summary
        }
    };

    // Keep standard output clean when it carries the archive.
    let report = format!(
        "{} Exported {}: {} commits, {} blocks, root {}",
        "✓".green().bold(),
        did,
        summary.commits,
        summary.blocks,
        summary.root.short_hex().yellow()
    );
    if args.output.is_some() {
        println!("{report}");
    } else {
        eprintln!("{report}");
    }
    Ok(())
}

fn cmd_import(cli: &Cli, args: &ImportArgs) -> anyhow::Result<()> {
    let service = open_service(cli)?;
    let did = parse_did(&args.did)?;
    let file = File::open(&args.archive).with_context(|| format!("opening {}", args.archive.display()))?;
    let summary = service.import_from(&did, BufReader::new(file), &service.context())?;

    if cli.format == OutputFormat::Json {
        return print_json(&json!({
            "did": did,
            "head": summary.head.as_ref().map(|h| h.commit.to_hex()),
            "version": summary.head.as_ref().map(|h| h.version),
            "commits": summary.commits,
            "blocks": summary.blocks,
        }));
    }
    match &summary.head {
        Some(head) => println!(
            "{} Imported {} commits ({} blocks) into {}; head {} v{}",
            "✓".green().bold(),
            summary.commits,
            summary.blocks,
            did.to_string().bold(),
            head.commit.short_hex().yellow(),
            head.version
        ),
        None => println!("{} {} has no commits", "✓".green().bold(), did.to_string().bold()),
    }
    Ok(())
}

fn cmd_compact(cli: &Cli, args: &CompactArgs) -> anyhow::Result<()> {
    let service = open_service(cli)?;
    let did = parse_did(&args.did)?;
    let mode = if args.aggressive {
        CompactionMode::Aggressive
    } else {
        CompactionMode::Normal
    };
    let report = service.compact(&did, mode, &service.context())?;

    if cli.format == OutputFormat::Json {
        return print_json(&json!({
            "did": did,
            "mode": mode,
            "retained_roots": report.retained_roots,
            "kept": report.kept,
            "removed": report.removed,
            "bytes_reclaimed": report.bytes_reclaimed,
        }));
    }
    println!(
        "{} Compacted {}: kept {} blocks from {} trees, removed {} ({} bytes)",
        "✓".green().bold(),
        did.to_string().bold(),
        report.kept,
        report.retained_roots,
        report.removed,
        report.bytes_reclaimed
    );
    Ok(())
}
