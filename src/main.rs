//! `salonbook` - CLI for salon record keeping
//!
//! This binary provides the command-line interface for managing customer,
//! treatment, and gallery records, and for controlling the backup engine.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::warn;

use salonbook::analytics;
use salonbook::cli::{
    BackupCommand, Cli, Command, ConfigCommand, CustomerCommand, GalleryCommand, OutputFormat,
    StatsCommand, TreatmentCommand,
};
use salonbook::model::{parse_tags, Customer, NewCustomer, NewTreatment};
use salonbook::{
    init_logging, BackupScheduler, Config, KvStore, Ledger, SnapshotManager, SnapshotTrigger,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        // Config commands don't need the store
        Command::Config(cmd) => handle_config(&config, cmd),
        command => {
            let kv = KvStore::open(config.store_path(), config.quota())?;
            let mut ledger = Ledger::load(kv)?;
            let snapshots = SnapshotManager::new(&config.backup);

            match command {
                Command::Customer(cmd) => handle_customer(&mut ledger, &snapshots, cmd).await,
                Command::Treatment(cmd) => handle_treatment(&mut ledger, &snapshots, cmd).await,
                Command::Gallery(cmd) => handle_gallery(&ledger, cmd),
                Command::Stats(cmd) => handle_stats(&ledger, &config, &cmd),
                Command::Backup(cmd) => handle_backup(&mut ledger, &snapshots, cmd),
                Command::Watch(_) => run_watch(&config, ledger, snapshots).await,
                Command::Config(_) => unreachable!("handled above"),
            }
        }
    }
}

/// Take a data-changed snapshot after a successful mutation. Snapshot
/// failures are logged, not propagated; the mutation itself succeeded.
fn snapshot_after_change(ledger: &Ledger, snapshots: &SnapshotManager) {
    if let Err(err) = snapshots.create(
        ledger.kv(),
        SnapshotTrigger::DataChanged,
        ledger.stats().into(),
    ) {
        warn!("Post-change snapshot failed: {err}");
    }
}

fn parse_date(text: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{text}', expected YYYY-MM-DD"))
}

async fn handle_customer(
    ledger: &mut Ledger,
    snapshots: &SnapshotManager,
    cmd: CustomerCommand,
) -> anyhow::Result<()> {
    match cmd {
        CustomerCommand::Add {
            name,
            kana,
            phone,
            email,
            birthday,
            address,
            allergies,
            notes,
        } => {
            let form = NewCustomer {
                name,
                kana: kana.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
                email: email.unwrap_or_default(),
                birthday: birthday.as_deref().map(parse_date).transpose()?,
                address: address.unwrap_or_default(),
                allergies: allergies.unwrap_or_default(),
                notes: notes.unwrap_or_default(),
            };
            let customer = ledger.add_customer(form)?;
            println!("Added customer {} ({})", customer.name, customer.id);
            snapshot_after_change(ledger, snapshots);
        }
        CustomerCommand::List {
            search,
            sort,
            format,
        } => {
            let customers = match &search {
                Some(query) => ledger.search_customers(query),
                None => ledger.sorted_customers(sort.into()),
            };
            print_customers(ledger, &customers, format)?;
        }
        CustomerCommand::Show { id, json } => {
            let customer = ledger
                .customer(&id)
                .ok_or_else(|| anyhow::anyhow!("no customer with id {id}"))?;
            let visits = ledger.treatments_for(&id);
            if json {
                let detail = serde_json::json!({
                    "customer": customer,
                    "treatments": visits,
                });
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                println!("Customer {}", customer.id);
                println!("  Name:      {}", customer.name);
                if !customer.kana.is_empty() {
                    println!("  Kana:      {}", customer.kana);
                }
                if !customer.phone.is_empty() {
                    println!("  Phone:     {}", customer.phone);
                }
                if !customer.email.is_empty() {
                    println!("  Email:     {}", customer.email);
                }
                if let Some(birthday) = customer.birthday {
                    println!("  Birthday:  {birthday}");
                }
                if !customer.allergies.is_empty() {
                    println!("  Allergies: {}", customer.allergies);
                }
                if !customer.notes.is_empty() {
                    println!("  Notes:     {}", customer.notes);
                }
                println!("  Visits:    {}", visits.len());
                for treatment in visits {
                    println!(
                        "    {} {} ¥{} {}",
                        treatment.date,
                        treatment.menu,
                        treatment.price,
                        treatment.tags.join(",")
                    );
                }
            }
        }
        CustomerCommand::Edit {
            id,
            name,
            kana,
            phone,
            email,
            birthday,
            address,
            allergies,
            notes,
        } => {
            let existing = ledger
                .customer(&id)
                .ok_or_else(|| anyhow::anyhow!("no customer with id {id}"))?
                .clone();
            let form = NewCustomer {
                name: name.unwrap_or(existing.name),
                kana: kana.unwrap_or(existing.kana),
                phone: phone.unwrap_or(existing.phone),
                email: email.unwrap_or(existing.email),
                birthday: match birthday {
                    Some(text) => Some(parse_date(&text)?),
                    None => existing.birthday,
                },
                address: address.unwrap_or(existing.address),
                allergies: allergies.unwrap_or(existing.allergies),
                notes: notes.unwrap_or(existing.notes),
            };
            let customer = ledger.edit_customer(&id, form)?;
            println!(
                "Updated customer {} (new id {})",
                customer.name, customer.id
            );
            snapshot_after_change(ledger, snapshots);
        }
        CustomerCommand::Delete { id, yes } => {
            if !yes {
                println!("This deletes the customer and all their treatment records.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let cascaded = ledger.delete_customer(&id)?;
            println!("Deleted customer {id} and {cascaded} treatment record(s)");
            snapshot_after_change(ledger, snapshots);
        }
    }
    Ok(())
}

fn print_customers(
    ledger: &Ledger,
    customers: &[&Customer],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(customers)?);
        }
        OutputFormat::Plain => {
            for customer in customers {
                println!("{} {}", customer.id, customer.name);
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<15} {:<20} {:<14} {:>7} {:<12}",
                "ID", "NAME", "PHONE", "VISITS", "LAST VISIT"
            );
            for customer in customers {
                let last = ledger
                    .last_visit(&customer.id)
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                println!(
                    "{:<15} {:<20} {:<14} {:>7} {:<12}",
                    customer.id,
                    customer.name,
                    customer.phone,
                    ledger.visit_count(&customer.id),
                    last
                );
            }
            println!("\n{} customer(s)", customers.len());
        }
    }
    Ok(())
}

async fn handle_treatment(
    ledger: &mut Ledger,
    snapshots: &SnapshotManager,
    cmd: TreatmentCommand,
) -> anyhow::Result<()> {
    match cmd {
        TreatmentCommand::Add {
            customer,
            date,
            menu,
            price,
            color,
            parts,
            shape,
            length,
            duration,
            staff,
            tags,
            next,
            photo,
        } => {
            let mut photos = Vec::with_capacity(photo.len());
            for path in &photo {
                photos.push(read_photo(path).await?);
            }
            let form = NewTreatment {
                customer_id: customer,
                date: Some(parse_date(&date)?),
                menu,
                color: color.unwrap_or_default(),
                parts: parts.unwrap_or_default(),
                shape: shape.unwrap_or_default(),
                length: length.unwrap_or_default(),
                duration_minutes: duration,
                price: Some(price),
                staff: staff.unwrap_or_default(),
                tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
                next_proposal: next.unwrap_or_default(),
                photos,
            };
            let treatment = ledger.add_treatment(form)?;
            println!(
                "Recorded treatment {} on {} (¥{})",
                treatment.id, treatment.date, treatment.price
            );
            if !photo.is_empty() {
                println!("  {} photo(s) added to the gallery", photo.len());
            }
            snapshot_after_change(ledger, snapshots);
        }
        TreatmentCommand::List {
            customer,
            limit,
            format,
        } => {
            let treatments: Vec<_> = match &customer {
                Some(id) => ledger.treatments_for(id),
                None => ledger.treatments_by_date(),
            }
            .into_iter()
            .take(limit)
            .collect();

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&treatments)?);
                }
                OutputFormat::Plain => {
                    for treatment in &treatments {
                        println!(
                            "{} {} {} ¥{}",
                            treatment.id, treatment.date, treatment.menu, treatment.price
                        );
                    }
                }
                OutputFormat::Table => {
                    println!(
                        "{:<15} {:<12} {:<24} {:>8} {:<20}",
                        "ID", "DATE", "MENU", "PRICE", "TAGS"
                    );
                    for treatment in &treatments {
                        println!(
                            "{:<15} {:<12} {:<24} {:>8} {:<20}",
                            treatment.id,
                            treatment.date.to_string(),
                            treatment.menu,
                            treatment.price,
                            treatment.tags.join(",")
                        );
                    }
                    println!("\n{} treatment(s)", treatments.len());
                }
            }
        }
    }
    Ok(())
}

/// Read a photo file and embed it as a base64 data URL, the form gallery
/// images are stored in.
async fn read_photo(path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read photo {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn handle_gallery(ledger: &Ledger, cmd: GalleryCommand) -> anyhow::Result<()> {
    match cmd {
        GalleryCommand::List {
            tag,
            season,
            color,
            format,
        } => {
            let images =
                ledger.filter_gallery(tag.as_deref(), season.map(Into::into), color.map(Into::into));
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&images)?);
                }
                OutputFormat::Plain => {
                    for image in &images {
                        println!("{} {}", image.id, image.tags.join(","));
                    }
                }
                OutputFormat::Table => {
                    println!(
                        "{:<15} {:<12} {:<8} {:<8} {:<24}",
                        "ID", "DATE", "SEASON", "COLOR", "TAGS"
                    );
                    for image in &images {
                        println!(
                            "{:<15} {:<12} {:<8} {:<8} {:<24}",
                            image.id,
                            image.date.to_string(),
                            image.season.map_or_else(|| "-".to_string(), |s| s.to_string()),
                            image.color.map_or_else(|| "-".to_string(), |c| c.to_string()),
                            image.tags.join(",")
                        );
                    }
                    println!("\n{} design(s)", images.len());
                }
            }
        }
    }
    Ok(())
}

fn handle_stats(ledger: &Ledger, config: &Config, cmd: &StatsCommand) -> anyhow::Result<()> {
    let (year, month) = match &cmd.month {
        Some(text) => analytics::parse_month(text)?,
        None => {
            let today = Utc::now().date_naive();
            (today.year(), today.month())
        }
    };

    let summary = analytics::monthly_summary(ledger.treatments(), year, month);
    let ranking = analytics::tag_ranking(ledger.treatments());
    let storage = if cmd.storage {
        Some(analytics::storage_report(ledger.kv(), config.quota())?)
    } else {
        None
    };

    if cmd.json {
        let report = serde_json::json!({
            "summary": summary,
            "popular_tags": ranking,
            "storage": storage,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Statistics for {year}-{month:02}");
    println!("=======================");
    println!("  Revenue:          ¥{}", summary.revenue);
    println!("  Treatments:       {}", summary.treatment_count);
    println!("  Unique customers: {}", summary.unique_customers);
    println!("  Repeat rate:      {:.0}%", summary.repeat_rate);
    println!("  Average price:    ¥{}", summary.average_price);

    if !ranking.is_empty() {
        println!();
        println!("Popular tags");
        for (rank, entry) in ranking.iter().enumerate() {
            println!("  {}. {} ({})", rank + 1, entry.tag, entry.count);
        }
    }

    if let Some(storage) = storage {
        println!();
        println!("Storage");
        println!("  Used:       {} bytes", storage.used_bytes);
        match storage.quota_bytes {
            Some(quota) => println!(
                "  Quota:      {} bytes ({:.1}% used)",
                quota,
                storage.percent_used().unwrap_or(0.0)
            ),
            None => println!("  Quota:      unlimited"),
        }
        println!("  Customers:  {} bytes", storage.customer_bytes);
        println!("  Treatments: {} bytes", storage.treatment_bytes);
        println!("  Gallery:    {} bytes", storage.gallery_bytes);
        println!(
            "  Backups:    {} bytes across {} snapshot(s)",
            storage.backup_bytes, storage.backup_count
        );
    }
    Ok(())
}

fn handle_backup(
    ledger: &mut Ledger,
    snapshots: &SnapshotManager,
    cmd: BackupCommand,
) -> anyhow::Result<()> {
    match cmd {
        BackupCommand::Create => {
            let meta = snapshots.create(
                ledger.kv(),
                SnapshotTrigger::Manual,
                ledger.stats().into(),
            )?;
            println!("Created snapshot {}", meta.key);
        }
        BackupCommand::List { format } => {
            let listed = snapshots.list(ledger.kv())?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&listed)?);
                }
                OutputFormat::Plain => {
                    for meta in &listed {
                        println!("{} {}", meta.key, meta.trigger);
                    }
                }
                OutputFormat::Table => {
                    println!(
                        "{:<28} {:<22} {:<12} {:>9} {:>10}",
                        "KEY", "CREATED", "TRIGGER", "CUSTOMERS", "TREATMENTS"
                    );
                    for meta in &listed {
                        println!(
                            "{:<28} {:<22} {:<12} {:>9} {:>10}",
                            meta.key,
                            meta.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                            meta.trigger.to_string(),
                            meta.stats.customer_count,
                            meta.stats.treatment_count
                        );
                    }
                    println!(
                        "\n{} of {} generation(s)",
                        listed.len(),
                        snapshots.max_generations()
                    );
                }
            }
        }
        BackupCommand::Restore { key, yes } => {
            let key = if key == "latest" {
                snapshots
                    .latest(ledger.kv())?
                    .map(|meta| meta.key)
                    .ok_or_else(|| anyhow::anyhow!("no snapshots available"))?
            } else {
                key
            };
            if !yes {
                println!("This overwrites the current records with snapshot {key}.");
                println!("A pre-restore snapshot of the current state will be kept.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let report = snapshots.restore(ledger.kv(), &key, ledger.stats().into())?;
            ledger.reload()?;
            println!(
                "Restored snapshot {} from {} ({} store(s))",
                report.key,
                report.timestamp.format("%Y-%m-%d %H:%M:%S"),
                report.restored_stores.len()
            );
            println!("Pre-restore state saved as {}", report.safety_key);
        }
        BackupCommand::Delete { key } => {
            snapshots.delete(ledger.kv(), &key)?;
            println!("Deleted snapshot {key}");
        }
        BackupCommand::Status { json } => {
            let listed = snapshots.list(ledger.kv())?;
            if json {
                let status = serde_json::json!({
                    "count": listed.len(),
                    "max_generations": snapshots.max_generations(),
                    "oldest": listed.first(),
                    "latest": listed.last(),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Backup status");
                println!("-------------");
                println!(
                    "  Generations: {} of {}",
                    listed.len(),
                    snapshots.max_generations()
                );
                if let Some(oldest) = listed.first() {
                    println!(
                        "  Oldest:      {} ({})",
                        oldest.key,
                        oldest.timestamp.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                if let Some(latest) = listed.last() {
                    println!(
                        "  Latest:      {} ({}, {})",
                        latest.key,
                        latest.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        latest.trigger
                    );
                }
            }
        }
    }
    Ok(())
}

/// Run the automatic snapshot service until interrupted.
///
/// Takes a startup snapshot, then keeps interval snapshots going. On
/// Ctrl-C a final shutdown snapshot is written before exiting.
async fn run_watch(
    config: &Config,
    ledger: Ledger,
    snapshots: SnapshotManager,
) -> anyhow::Result<()> {
    let ledger = Arc::new(Mutex::new(ledger));
    let scheduler = Arc::new(BackupScheduler::new(
        Arc::clone(&ledger),
        Arc::new(snapshots),
        &config.backup,
    ));

    let startup = scheduler.snapshot_now(SnapshotTrigger::Startup).await?;
    println!("Startup snapshot {}", startup.key);
    println!(
        "Watching; interval snapshot every {}s. Press Ctrl-C to stop.",
        config.backup.interval_secs
    );

    let interval_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_interval().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    interval_task.abort();
    scheduler.cancel_pending();
    let shutdown = scheduler.snapshot_now(SnapshotTrigger::Shutdown).await?;
    println!("\nShutdown snapshot {}", shutdown.key);
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Store path:      {}", config.store_path().display());
                match config.quota() {
                    Some(quota) => println!("  Quota:           {quota} bytes"),
                    None => println!("  Quota:           unlimited"),
                }
                println!();
                println!("[Backup]");
                println!("  Max generations: {}", config.backup.max_generations);
                println!("  Interval:        {}s", config.backup.interval_secs);
                println!("  Debounce:        {}ms", config.backup.debounce_ms);
                println!("  On change:       {}", config.backup.backup_on_change);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
