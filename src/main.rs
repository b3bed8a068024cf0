use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use autodash::cards::{AllowAllPolicy, CardInstance};
use autodash::catalog::InMemoryCatalog;
use autodash::dashboard::{generate_dashboard, DashboardId, DashboardMetadata, DashboardRenderer};
use autodash::loader;
use autodash::types::TypeLattice;

#[derive(Parser)]
#[command(name = "autodash")]
#[command(about = "Rule-driven dashboard generation for database tables")]
struct Args {
    /// Path to the catalog snapshot JSON
    catalog: PathBuf,

    /// Path to the rule library JSON
    rules: PathBuf,

    /// Table to generate a dashboard for
    #[arg(short, long)]
    table: u64,
}

/// Prints the generated dashboard as JSON
struct PrintingRenderer;

impl DashboardRenderer for PrintingRenderer {
    fn create_dashboard(
        &self,
        metadata: &DashboardMetadata,
        cards: &[CardInstance],
    ) -> autodash::Result<DashboardId> {
        let document = serde_json::json!({
            "title": metadata.title,
            "description": metadata.description,
            "cards": cards.iter().map(CardInstance::to_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        Ok(1)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let lattice = TypeLattice::builtin();
    let catalog = InMemoryCatalog::load_from_file(&args.catalog)?;
    let library = loader::load_from_file(&args.rules, &lattice)?;
    info!("Loaded {} rules", library.len());

    match generate_dashboard(
        args.table,
        &library,
        &catalog,
        &lattice,
        &AllowAllPolicy,
        &PrintingRenderer,
    )? {
        Some(id) => info!("Dashboard {} created", id),
        None => info!("No dashboard could be generated for table {}", args.table),
    }

    Ok(())
}
