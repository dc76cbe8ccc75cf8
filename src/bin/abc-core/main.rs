//! abc-core - inspect cache archives.

use std::env;
use std::process;
use std::time::Instant;

use alembic_core::abc::{library_version_string, IArchive, ICompoundProperty, IObject, IProperty};
use alembic_core::core::{ArraySample, ScalarSample, TimeSampling};
use alembic_core::util::{convert_pod_buffer, DataType, PlainOldDataType};
use alembic_core::Result;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Values shown per sample in text mode.
const PREVIEW_VALUES: usize = 8;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "warn";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "info" | "i" => with_file(&filtered_args, "info <file.abc>", cmd_info),
        "tree" | "t" => with_file(&filtered_args, "tree <file.abc>", cmd_tree),
        "stats" | "s" => with_file(&filtered_args, "stats <file.abc>", cmd_stats),
        "dump" | "d" => {
            let json_mode = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
            let positional: Vec<&str> = filtered_args[1..]
                .iter()
                .copied()
                .filter(|&s| s != "--json" && s != "-j")
                .collect();
            match positional.as_slice() {
                [file, path, ..] => open(file).and_then(|a| cmd_dump(&a, path, json_mode)),
                [file] => open(file).and_then(|a| cmd_dump(&a, "/", json_mode)),
                [] => usage("dump <file.abc> [object-path] [--json]"),
            }
        }
        "version" | "--version" => {
            println!("{}", library_version_string());
            Ok(())
        }
        "help" | "h" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        // A bare file argument is the same as `info`
        path if path.ends_with(".abc") => open(path).and_then(|a| cmd_info(&a)),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_help() {
    println!("abc-core - cache archive inspector");
    println!();
    println!("USAGE:");
    println!("    abc-core [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file>                 Show archive metadata and time samplings");
    println!("    t, tree   <file>                 Show the object hierarchy with properties");
    println!("    s, stats  <file>                 Count objects, properties, samples and payloads");
    println!("    d, dump   <file> [path] [--json] Dump the samples of one object");
    println!("    version                          Show the library version");
    println!("    h, help                          Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show errors");
    println!();
    println!("RUST_LOG overrides the log level flags.");
}

fn usage(args: &str) -> Result<()> {
    eprintln!("Error: missing argument");
    eprintln!("Usage: abc-core {}", args);
    process::exit(1);
}

fn open(path: &str) -> Result<IArchive> {
    tracing::info!("opening archive {}", path);
    IArchive::open(path)
}

fn with_file(args: &[&str], usage_line: &str, cmd: fn(&IArchive) -> Result<()>) -> Result<()> {
    match args.get(1) {
        Some(path) => cmd(&open(path)?),
        None => usage(usage_line),
    }
}

// ============================================================================
// info
// ============================================================================

fn cmd_info(archive: &IArchive) -> Result<()> {
    println!("Archive:        {}", archive.name());
    println!("Backend:        {}", archive.backend_name());
    println!("Format version: {}", archive.format_version());
    println!("Library:        {}", archive.library_version());
    if let Some(v) = archive.writer_version() {
        println!("Written by:     {}", v);
    }
    if let Some(app) = archive.application() {
        println!("Application:    {}", app);
    }
    if let Some(date) = archive.date_written() {
        println!("Date written:   {}", date);
    }
    if let Some(desc) = archive.description() {
        println!("Description:    {}", desc);
    }
    println!("Index:          {}", if archive.has_hierarchy_index() { "yes" } else { "no" });
    println!();

    println!("Time samplings: {}", archive.num_time_samplings());
    for i in 0..archive.num_time_samplings() as u32 {
        if let Some(ts) = archive.time_sampling(i) {
            let max = archive.max_num_samples_for_time_sampling(i).unwrap_or(0);
            println!("  [{}] {} (max {} samples)", i, describe_time_sampling(&ts), max);
        }
    }
    Ok(())
}

fn describe_time_sampling(ts: &TimeSampling) -> String {
    let kind = ts.sampling_type().name();
    if ts.is_static() {
        return kind.to_string();
    }
    format!("{} per-cycle={} times={:?}", kind, ts.time_per_cycle(), ts.stored_times())
}

// ============================================================================
// tree
// ============================================================================

fn cmd_tree(archive: &IArchive) -> Result<()> {
    println!("Archive: {}", archive.name());
    println!();
    print_tree(&archive.top(), 0)
}

fn print_tree(obj: &IObject, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    println!("{}{}", indent, if obj.is_top() { "/" } else { obj.name() });
    print_properties(&obj.properties()?, depth + 1)?;
    for child in obj.children()? {
        print_tree(&child, depth + 1)?;
    }
    Ok(())
}

fn print_properties(props: &ICompoundProperty, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for prop in props.properties()? {
        match &prop {
            IProperty::Compound(c) => {
                println!("{}.{} {{}}", indent, c.name());
                print_properties(c, depth + 1)?;
            }
            IProperty::Scalar(s) => {
                println!("{}.{} : {} scalar x{}", indent, s.name(), s.data_type(), s.num_samples());
            }
            IProperty::Array(a) => {
                println!("{}.{} : {}[] array x{}", indent, a.name(), a.data_type(), a.num_samples());
            }
        }
    }
    Ok(())
}

// ============================================================================
// stats
// ============================================================================

#[derive(Default)]
struct Stats {
    objects: usize,
    compounds: usize,
    scalars: usize,
    arrays: usize,
    samples: usize,
    constant: usize,
    payloads: usize,
}

fn cmd_stats(archive: &IArchive) -> Result<()> {
    let start = Instant::now();
    let mut stats = Stats::default();
    collect_stats(&archive.top(), &mut stats)?;
    let elapsed = start.elapsed();

    println!("Archive: {}", archive.name());
    println!();
    println!("Objects:            {}", stats.objects);
    println!("Compound properties {}", stats.compounds);
    println!("Scalar properties:  {}", stats.scalars);
    println!("Array properties:   {}", stats.arrays);
    println!("Constant:           {}", stats.constant);
    println!("Samples:            {}", stats.samples);
    println!("Array payloads:     {}", stats.payloads);
    println!();
    println!("Walked in {:.2?}", elapsed);
    Ok(())
}

fn collect_stats(obj: &IObject, stats: &mut Stats) -> Result<()> {
    stats.objects += 1;
    collect_property_stats(&obj.properties()?, stats)?;
    for child in obj.children()? {
        collect_stats(&child, stats)?;
    }
    Ok(())
}

fn collect_property_stats(props: &ICompoundProperty, stats: &mut Stats) -> Result<()> {
    for prop in props.properties()? {
        match &prop {
            IProperty::Compound(c) => {
                stats.compounds += 1;
                collect_property_stats(c, stats)?;
            }
            IProperty::Scalar(s) => {
                stats.scalars += 1;
                stats.samples += s.num_samples();
                stats.constant += usize::from(s.is_constant());
            }
            IProperty::Array(a) => {
                stats.arrays += 1;
                stats.samples += a.num_samples();
                stats.constant += usize::from(a.is_constant());
                stats.payloads += a.num_unique_payloads()?;
            }
        }
    }
    Ok(())
}

// ============================================================================
// dump
// ============================================================================

fn cmd_dump(archive: &IArchive, path: &str, json_mode: bool) -> Result<()> {
    let Some(obj) = archive.find_object(path)? else {
        eprintln!("No object at {}", path);
        process::exit(1);
    };
    let props = obj.properties()?;

    if json_mode {
        let out = json!({
            "object": obj.full_name(),
            "meta_data": obj.meta_data().serialize(),
            "properties": compound_json(&props)?,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    println!("{}", obj.full_name());
    if !obj.meta_data().is_empty() {
        println!("  meta: {}", obj.meta_data().serialize());
    }
    dump_properties(&props, 1)
}

fn dump_properties(props: &ICompoundProperty, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    for prop in props.properties()? {
        match &prop {
            IProperty::Compound(c) => {
                println!("{}{} {{}}", indent, c.path());
                dump_properties(c, depth + 1)?;
            }
            IProperty::Scalar(s) => {
                println!("{}{} : {}", indent, s.path(), s.data_type());
                for i in 0..s.num_samples() {
                    let values = scalar_values(&s.sample(i)?)?;
                    println!("{}  [{}] t={} {}", indent, i, s.sample_time(i), preview(&values));
                }
            }
            IProperty::Array(a) => {
                println!("{}{} : {}[]", indent, a.path(), a.data_type());
                for i in 0..a.num_samples() {
                    let sample = a.sample(i)?;
                    let values = array_values(&sample)?;
                    println!(
                        "{}  [{}] t={} dims={:?} {}",
                        indent,
                        i,
                        a.sample_time(i),
                        sample.dims().sizes(),
                        preview(&values)
                    );
                }
            }
        }
    }
    Ok(())
}

fn compound_json(props: &ICompoundProperty) -> Result<Value> {
    let mut out = serde_json::Map::new();
    for prop in props.properties()? {
        let value = match &prop {
            IProperty::Compound(c) => compound_json(c)?,
            IProperty::Scalar(s) => {
                let samples = (0..s.num_samples())
                    .map(|i| Ok(json!({ "time": s.sample_time(i), "values": scalar_values(&s.sample(i)?)? })))
                    .collect::<Result<Vec<_>>>()?;
                json!({ "kind": "scalar", "type": s.data_type().to_string(), "samples": samples })
            }
            IProperty::Array(a) => {
                let samples = (0..a.num_samples())
                    .map(|i| {
                        let sample = a.sample(i)?;
                        Ok(json!({
                            "time": a.sample_time(i),
                            "dims": sample.dims().sizes(),
                            "key": a.sample_key(i)?.digest_hex(),
                            "values": array_values(&sample)?,
                        }))
                    })
                    .collect::<Result<Vec<_>>>()?;
                json!({ "kind": "array", "type": a.data_type().to_string(), "samples": samples })
            }
        };
        out.insert(prop.name().to_string(), value);
    }
    Ok(Value::Object(out))
}

fn scalar_values(sample: &ScalarSample) -> Result<Vec<Value>> {
    values_json(sample.data_type(), sample.bytes(), || sample.strings())
}

fn array_values(sample: &ArraySample) -> Result<Vec<Value>> {
    values_json(sample.data_type(), sample.bytes(), || sample.strings())
}

fn values_json(
    data_type: DataType,
    bytes: &[u8],
    strings: impl FnOnce() -> Result<Vec<String>>,
) -> Result<Vec<Value>> {
    if data_type.is_string() {
        return Ok(strings()?.into_iter().map(Value::from).collect());
    }
    let wide = convert_pod_buffer(bytes, data_type.pod, PlainOldDataType::Float64)?;
    let values = ScalarSample::new(DataType::scalar(PlainOldDataType::Float64), wide).values::<f64>()?;
    Ok(values.into_iter().map(Value::from).collect())
}

fn preview(values: &[Value]) -> String {
    let shown: Vec<String> = values.iter().take(PREVIEW_VALUES).map(|v| v.to_string()).collect();
    if values.len() > PREVIEW_VALUES {
        format!("[{}, ... {} more]", shown.join(", "), values.len() - PREVIEW_VALUES)
    } else {
        format!("[{}]", shown.join(", "))
    }
}
