use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use scout_core::config::{Config, Settings};
use scout_core::types::{BulkOperation, RecordType};
use scout_memory::{read_seed_dir, MemoryDocumentStore, MemoryRecordStore};
use scout_search::{BulkWriter, PageItems, SearchBuilder, SearchContext};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: scout <search|count|page|scan|explain> <seed_dir> <index> [options]
Options:
  --match field=text    full-text clause (repeatable)
  --term field=value    exact filter (repeatable)
  --sort field[:desc]   sort clause (repeatable)
  --trashed with|only   soft-delete visibility
  --page N              page number for `page`
  --per-page N          page size for `page`
  --chunk N             cursor chunk size for `scan`";

#[derive(Debug, Default, PartialEq)]
struct Options {
    matches: Vec<(String, String)>,
    terms: Vec<(String, String)>,
    sorts: Vec<(String, String)>,
    trashed: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
    chunk: Option<usize>,
}

fn split_pair(raw: &str, flag: &str) -> Result<(String, String)> {
    let (field, value) = raw.split_once('=').with_context(|| format!("{flag} expects field=value"))?;
    Ok((field.to_string(), value.to_string()))
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter.next().with_context(|| format!("{flag} needs a value"))?;
        match flag.as_str() {
            "--match" => options.matches.push(split_pair(value, flag)?),
            "--term" => options.terms.push(split_pair(value, flag)?),
            "--sort" => {
                let (field, order) = value.split_once(':').unwrap_or((value.as_str(), "asc"));
                options.sorts.push((field.to_string(), order.to_string()));
            }
            "--trashed" => options.trashed = Some(value.clone()),
            "--page" => options.page = Some(value.parse().context("--page expects a number")?),
            "--per-page" => options.per_page = Some(value.parse().context("--per-page expects a number")?),
            "--chunk" => options.chunk = Some(value.parse().context("--chunk expects a number")?),
            other => bail!("unknown option {other}"),
        }
    }
    Ok(options)
}

/// Load every seed document through the bulk endpoint and mirror it into the
/// record store.
fn seeded_context(settings: &Settings, seed_dir: &Path) -> Result<SearchContext> {
    let docs = Arc::new(MemoryDocumentStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let seed = read_seed_dir(seed_dir)?;

    let operations: Vec<BulkOperation> = seed
        .iter()
        .map(|d| BulkOperation::Index { index: d.index.clone(), key: d.key.clone(), document: d.source.clone() })
        .collect();
    BulkWriter::new(docs.clone()).write(&operations)?;
    for document in &seed {
        records.insert(document.to_record(&document.index, &settings.soft_delete_field));
    }
    info!(documents = seed.len(), dir = %seed_dir.display(), "seeded in-memory store");

    Ok(SearchContext::new(settings.clone(), records).with_connection(&settings.default_connection, docs))
}

fn build_search(ctx: &SearchContext, index: &str, options: &Options) -> Result<SearchBuilder> {
    let mut record_type = RecordType::new(index, index);
    if ctx.settings().soft_delete {
        record_type = record_type.with_soft_deletes();
    }
    let mut search = ctx.search(record_type)?;
    for (field, text) in &options.matches {
        search.bool_query_mut().must(json!({ "match": { field.as_str(): text } }));
    }
    for (field, value) in &options.terms {
        search.bool_query_mut().filter(json!({ "term": { field.as_str(): value } }));
    }
    for (field, order) in &options.sorts {
        search.sort_by(field, order);
    }
    match options.trashed.as_deref() {
        None => {}
        Some("with") => {
            search.bool_query_mut().with_trashed();
        }
        Some("only") => {
            search.bool_query_mut().only_trashed();
        }
        Some(other) => bail!("--trashed expects with|only, got {other}"),
    }
    Ok(search)
}

fn run(cmd: &str, search: &SearchBuilder, options: &Options) -> Result<()> {
    match cmd {
        "search" => {
            let result = search.execute()?;
            println!("🔍 {} hit(s), total {:?}", result.hits().len(), result.total());
            for (i, hit) in result.hits().iter().enumerate() {
                let record = hit.record()?;
                let attributes = record.map(|r| serde_json::Value::Object(r.attributes.clone()));
                println!("  {}. id={} score={:?} record={}", i + 1, hit.key(), hit.score(), attributes.unwrap_or_default());
            }
        }
        "count" => println!("{}", search.count()?),
        "page" => {
            let mut page = search.paginate(options.per_page, None, options.page)?;
            page.only_records();
            println!("📄 page {}/{} ({} total)", page.current_page(), page.last_page(), page.total());
            if let PageItems::Records(records) = page.items()? {
                for record in records {
                    println!("  {} {}", record.key, serde_json::Value::Object(record.attributes.clone()));
                }
            }
        }
        "scan" => {
            let total = search.count()?;
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hits")?
                    .progress_chars("#>-"),
            );
            let mut seen = 0u64;
            for hit in search.cursor(options.chunk, None)? {
                hit?;
                seen += 1;
                pb.set_position(seen);
            }
            pb.finish_with_message("done");
            println!("✅ scanned {seen} hit(s)");
        }
        "explain" => println!("{}", serde_json::to_string_pretty(&search.build_request()?)?),
        other => bail!("unknown command {other}\n{USAGE}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let options = parse_options(&args[3..])?;

    let ctx = seeded_context(&settings, Path::new(&args[1]))?;
    let search = build_search(&ctx, &args[2], &options)?;
    run(&args[0], &search, &options)
}
