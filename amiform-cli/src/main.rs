mod apply;
mod manifest;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use amiform_core::differ::create_plan;
use amiform_core::effect::Effect;
use amiform_core::plan::Plan;
use amiform_core::provider::Provider;
use amiform_core::resource::{Resource, ResourceId, State, Value};
use amiform_core::schema::{Mutability, Presence, ResourceSchema};
use amiform_provider_aws::AwsProvider;
use amiform_provider_aws::schemas;
use amiform_state::{LockInfo, StateBackend, StateFile, create_backend};

use crate::apply::{ApplyOutcome, apply_plan, destroy_all, refresh_states};
use crate::manifest::Manifest;

const DEFAULT_MANIFEST: &str = "main.amiform.json";

#[derive(Parser)]
#[command(name = "amiform")]
#[command(about = "Declarative management of EC2 machine images", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest
    Validate {
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        #[arg(default_value = DEFAULT_MANIFEST)]
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show the attributes of a resource type
    Schema {
        /// Resource type (e.g., ec2.ami_copy); lists all types when omitted
        resource_type: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    schemas::all_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

/// Parse and validate a manifest, returning it with its resources
fn load_manifest(file: &Path) -> Result<(Manifest, Vec<Resource>), String> {
    let manifest = Manifest::load(file)?;
    let resources = manifest.resources()?;
    manifest::validate(&manifest, &resources, &get_schemas())?;
    Ok((manifest, resources))
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (_, resources) = load_manifest(file)?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let (manifest, resources) = load_manifest(file)?;
    let provider = get_provider(&manifest).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let state = read_state(backend.as_ref()).await?;
    let current = refresh_states(&provider, &state).await?;
    let plan = create_plan(&resources, &current, &get_schemas());
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path) -> Result<(), String> {
    let (manifest, resources) = load_manifest(file)?;
    let provider = get_provider(&manifest).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let lock = acquire_lock(backend.as_ref(), "apply").await?;
    let result = apply_locked(&provider, backend.as_ref(), &resources).await;
    release_lock(backend.as_ref(), &lock).await;

    let outcome = result?;
    println!();
    if outcome.failed == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", outcome.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            outcome.succeeded, outcome.failed
        ))
    }
}

async fn apply_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    resources: &[Resource],
) -> Result<ApplyOutcome, String> {
    let mut state = read_state(backend).await?;
    let current = refresh_states(provider, &state).await?;
    let plan = create_plan(resources, &current, &get_schemas());

    if plan.mutation_count() == 0 {
        println!("{}", "No changes needed.".green());
        return Ok(ApplyOutcome::default());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    apply_plan(provider, backend, &mut state, &plan).await
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let (manifest, _) = load_manifest(file)?;
    let provider = get_provider(&manifest).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let lock = acquire_lock(backend.as_ref(), "destroy").await?;
    let result = destroy_locked(&provider, backend.as_ref(), auto_approve).await;
    release_lock(backend.as_ref(), &lock).await;

    let Some(outcome) = result? else {
        return Ok(());
    };
    println!();
    if outcome.failed == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", outcome.succeeded)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            outcome.succeeded, outcome.failed
        ))
    }
}

/// Returns `None` when there was nothing to do or the user declined
async fn destroy_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<Option<ApplyOutcome>, String> {
    let mut state = read_state(backend).await?;
    let current = refresh_states(provider, &state).await?;

    if current.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(None);
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    let mut ids: Vec<&ResourceId> = current.keys().collect();
    ids.sort();
    for id in ids.iter().rev() {
        println!("  {} {}", "-".red().bold(), id);
    }
    println!();
    println!("Plan: {} to destroy.", current.len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(None);
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    destroy_all(provider, backend, &mut state, &current)
        .await
        .map(Some)
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn get_provider(manifest: &Manifest) -> Result<AwsProvider, String> {
    AwsProvider::new(&manifest.provider)
        .await
        .map_err(|e| format!("Invalid provider configuration: {}", e))
}

async fn read_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn acquire_lock(backend: &dyn StateBackend, operation: &str) -> Result<LockInfo, String> {
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| e.to_string())?;
    log::debug!("Acquired state lock {}", lock.id);
    Ok(lock)
}

async fn release_lock(backend: &dyn StateBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        eprintln!(
            "{} failed to release state lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let schemas = get_schemas();

    let Some(resource_type) = resource_type else {
        let mut names: Vec<&String> = schemas.keys().collect();
        names.sort();
        for name in names {
            let description = schemas[name].description.as_deref().unwrap_or_default();
            println!("{}  {}", name.cyan().bold(), description);
        }
        return Ok(());
    };

    let schema = schemas
        .get(resource_type)
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))?;

    println!("{}", schema.resource_type.cyan().bold());
    if let Some(description) = &schema.description {
        println!("{}", description);
    }
    println!();
    for line in schema_rows(schema) {
        println!("  {}", line);
    }
    Ok(())
}

/// One line per attribute: name, type, flags, default
fn schema_rows(schema: &ResourceSchema) -> Vec<String> {
    let attributes = schema.sorted_attributes();
    let width = attributes.iter().map(|a| a.name.len()).max().unwrap_or(0);

    attributes
        .into_iter()
        .map(|attr| {
            let mut flags = vec![match attr.presence {
                Presence::Required => "required",
                Presence::Optional => "optional",
                Presence::Computed => "computed",
                Presence::OptionalComputed => "optional, computed",
            }];
            if attr.mutability == Mutability::ForceNew {
                flags.push("forces new");
            }

            let mut line = format!(
                "{:width$}  {} ({})",
                attr.name,
                attr.attr_type,
                flags.join(", "),
                width = width
            );
            if let Some(default) = &attr.default {
                line.push_str(&format!(" = {}", format_value(default)));
            }
            if let Some(description) = &attr.description {
                line.push_str(&format!("  {}", description));
            }
            line
        })
        .collect()
}

fn print_plan(plan: &Plan) {
    if plan.mutation_count() == 0 {
        println!("{}", "No changes. Images are up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                for (key, value) in sorted_attributes(&r.attributes) {
                    println!("      {}: {}", key, format_value(value).green());
                }
            }
            Effect::Update { id, from, to } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                print_changes(from, &to.attributes);
            }
            Effect::Replace {
                id,
                from,
                to,
                forced_by,
            } => {
                let reason = if forced_by.is_empty() {
                    "tainted".to_string()
                } else {
                    format!("forced by {}", forced_by.join(", "))
                };
                println!(
                    "  {} {} ({})",
                    "-/+".magenta().bold(),
                    id.to_string().cyan().bold(),
                    reason
                );
                print_changes(from, &to.attributes);
            }
            Effect::Delete { id, from } => {
                let identifier = from.identifier.as_deref().unwrap_or("unknown");
                println!(
                    "  {} {} ({})",
                    "-".red().bold(),
                    id.to_string().cyan().bold(),
                    identifier.red()
                );
            }
            Effect::Read(_) => {}
        }
    }

    println!();
    println!("{}", plan.summary());
}

fn print_changes(from: &State, to: &HashMap<String, Value>) {
    for (key, new_value) in sorted_attributes(to) {
        let old_value = from.attributes.get(key);
        if old_value == Some(new_value) {
            continue;
        }
        let old_str = old_value
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        println!(
            "      {}: {} → {}",
            key,
            old_str.red(),
            format_value(new_value).green()
        );
    }
}

/// Attributes in display order: `name` first, then alphabetical
fn sorted_attributes(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = attributes.iter().collect();
    entries.sort_by(|(a, _), (b, _)| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    entries
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let inner: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_nested_values() {
        let mut device = HashMap::new();
        device.insert("volume_size".to_string(), Value::Int(8));
        device.insert("device_name".to_string(), Value::from("/dev/xvda"));

        assert_eq!(
            format_value(&Value::List(vec![Value::Map(device)])),
            "[{device_name: \"/dev/xvda\", volume_size: 8}]"
        );
        assert_eq!(format_value(&Value::Bool(false)), "false");
    }

    #[test]
    fn name_sorts_first() {
        let mut attributes = HashMap::new();
        attributes.insert("description".to_string(), Value::from("d"));
        attributes.insert("name".to_string(), Value::from("n"));
        attributes.insert("encrypted".to_string(), Value::Bool(true));

        let keys: Vec<&str> = sorted_attributes(&attributes)
            .into_iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["name", "description", "encrypted"]);
    }

    #[test]
    fn schema_rows_flag_force_new_and_defaults() {
        let schema = get_schemas().remove("ec2.ami_copy").unwrap();
        let rows = schema_rows(&schema);

        let source = rows
            .iter()
            .find(|r| r.starts_with("source_ami_id "))
            .unwrap();
        assert!(source.contains("(required, forces new)"));

        let encrypted = rows.iter().find(|r| r.starts_with("encrypted ")).unwrap();
        assert!(encrypted.contains("= false"));

        let tags = rows.iter().find(|r| r.starts_with("tags ")).unwrap();
        assert!(!tags.contains("forces new"));
    }

    #[test]
    fn cli_parses_destroy_flags() {
        let cli = Cli::try_parse_from(["amiform", "-vv", "destroy", "--auto-approve"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Destroy { file, auto_approve } => {
                assert_eq!(file, PathBuf::from(DEFAULT_MANIFEST));
                assert!(auto_approve);
            }
            _ => panic!("expected destroy"),
        }
    }
}
