use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use carspotter_contracts::cards::{missing_fields, Card, Powertrain, RenderVariant, SpecSheet};
use carspotter_contracts::records::parse_response;
use carspotter_engine::{AddOptions, Collection, CollectionConfig};
use clap::{Parser, Subcommand};
use log::debug;

#[derive(Debug, Parser)]
#[command(name = "carspotter", version, about = "Identify and collect photographed cars")]
struct Cli {
    /// Collection directory holding images and metadata.json.
    #[arg(long, global = true)]
    collection: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Add(AddArgs),
    Gallery(GalleryArgs),
    Prune,
    Annotate(AnnotateArgs),
    Parse(ParseArgs),
}

#[derive(Debug, Parser)]
struct AddArgs {
    #[arg(long)]
    image: PathBuf,
    /// Ask the identifier for the car's bounding box too.
    #[arg(long)]
    bbox: bool,
    /// Merge third-party specifications into the record.
    #[arg(long)]
    enrich: bool,
    #[arg(long)]
    identifier: Option<String>,
    #[arg(long)]
    vision_model: Option<String>,
}

#[derive(Debug, Parser)]
struct GalleryArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct AnnotateArgs {
    /// Annotate a single record; all boxed records otherwise.
    #[arg(long)]
    key: Option<String>,
}

#[derive(Debug, Parser)]
struct ParseArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    bbox: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("carspotter error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = CollectionConfig::from_env();
    if let Some(dir) = cli.collection {
        config.collection_dir = dir;
    }
    if cli.events.is_some() {
        config.events_path = cli.events;
    }
    debug!("using collection {}", config.collection_dir.display());

    match cli.command {
        Command::Add(args) => run_add(config, args),
        Command::Gallery(args) => run_gallery(&config, args),
        Command::Prune => run_prune(&config),
        Command::Annotate(args) => run_annotate(&config, args),
        Command::Parse(args) => run_parse(args),
    }
}

fn run_add(mut config: CollectionConfig, args: AddArgs) -> Result<i32> {
    if let Some(identifier) = args.identifier {
        config.identifier = identifier;
    }
    if let Some(model) = args.vision_model {
        config.vision_model = model;
    }
    let image = fs::read(&args.image)
        .with_context(|| format!("failed reading {}", args.image.display()))?;
    let collection = Collection::from_config(&config)?;
    let added = collection.add_vehicle(
        &image,
        AddOptions {
            want_bbox: args.bbox,
            enrich: args.enrich,
        },
    )?;
    println!("Added {} as {}", added.record.title(), added.key);
    if let Some(bounding_box) = added.record.bounding_box {
        println!(
            "Box: ({}, {}) to ({}, {})",
            bounding_box.x1, bounding_box.y1, bounding_box.x2, bounding_box.y2
        );
    }
    if added.degradation.is_some() {
        println!("Bounding box was invalid and has been dropped");
    }
    if args.enrich && !added.enriched {
        println!("Specifications unavailable; saved without enrichment");
    }
    Ok(0)
}

fn run_gallery(config: &CollectionConfig, args: GalleryArgs) -> Result<i32> {
    let cards = Collection::from_config(config)?.gallery()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cards)?);
        return Ok(0);
    }
    if cards.is_empty() {
        println!("No cars collected yet in {}", config.collection_dir.display());
        return Ok(0);
    }
    for card in &cards {
        for line in card_lines(card) {
            println!("{line}");
        }
        println!();
    }
    Ok(0)
}

fn run_prune(config: &CollectionConfig) -> Result<i32> {
    let removed = Collection::from_config(config)?.prune()?;
    if removed.is_empty() {
        println!("Nothing to prune");
    }
    for key in removed {
        println!("Pruned {key}");
    }
    Ok(0)
}

fn run_annotate(config: &CollectionConfig, args: AnnotateArgs) -> Result<i32> {
    let collection = Collection::from_config(config)?;
    let written = match args.key {
        Some(key) => collection.annotate(&key)?.into_iter().collect(),
        None => collection.annotate_all()?,
    };
    if written.is_empty() {
        println!("No boxed records to annotate");
    }
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(0)
}

fn run_parse(args: ParseArgs) -> Result<i32> {
    let record = parse_response(&args.text, args.bbox)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(0)
}

fn card_lines(card: &Card) -> Vec<String> {
    let mut lines = vec![format!("{}  {}  [{}]", card.title, card.accent_color, card.key)];
    if let Some(logo) = &card.logo_url {
        lines.push(format!("  logo: {logo}"));
    }
    match &card.variant {
        RenderVariant::FullSpec(sheet) => lines.extend(spec_lines(sheet)),
        RenderVariant::Minimal if card.record.enrichment.is_some() => {
            let missing = missing_fields(&card.record)
                .into_iter()
                .map(|field| field.label())
                .collect::<Vec<&str>>();
            lines.push(format!("  missing: {}", missing.join(", ")));
        }
        RenderVariant::Minimal => {}
    }
    lines
}

fn spec_lines(sheet: &SpecSheet) -> Vec<String> {
    let engine = match &sheet.powertrain {
        Powertrain::Electric => "electric".to_string(),
        Powertrain::Combustion {
            displacement,
            cylinders,
        } => format!("{displacement} L, {cylinders} cylinders"),
    };
    vec![
        format!(
            "  {} | {} | {}",
            sheet.drivetrain, sheet.fuel_type, sheet.vehicle_class
        ),
        format!("  engine: {engine}"),
        format!(
            "  mpg: {} city / {} highway / {} average",
            format_mpg(sheet.city_mpg),
            format_mpg(sheet.highway_mpg),
            format_mpg(sheet.average_mpg)
        ),
    ]
}

fn format_mpg(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}
