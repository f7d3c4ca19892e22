//! Writes a synthetic customer dataset for local runs:
//! `generate_sample [rows] [path]`, defaults 5000 and `sample_customers.parquet`.
//! Point `source.local_path` in segment-dash.toml at the output.

use std::fs::File;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

const FIRST_NAMES: [&str; 10] = [
    "Ana", "Bruno", "Carla", "Diego", "Elisa", "Felipe", "Gabriela", "Hugo", "Isabela", "João",
];
const LAST_NAMES: [&str; 8] = [
    "Silva", "Souza", "Oliveira", "Santos", "Pereira", "Lima", "Costa", "Almeida",
];
const CATEGORIES: [&str; 4] = ["A", "B", "C", "D"];
const SECTORS: [&str; 6] = ["Varejo", "Tecnologia", "Saúde", "Educação", "Indústria", "Serviços"];
const STATUSES: [&str; 3] = ["ativo", "inativo", "prospecto"];

/// SplitMix64; reproducible output for a fixed seed.
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (date - epoch).num_days() as i32
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let rows: usize = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid row count '{n}'"))?,
        None => 5_000,
    };
    let output_path = args
        .next()
        .unwrap_or_else(|| "sample_customers.parquet".to_string());

    let mut rng = Rng(42);
    let reference = NaiveDate::from_ymd_opt(2025, 6, 30).context("reference date")?;

    let mut ids = Vec::with_capacity(rows);
    let mut names = Vec::with_capacity(rows);
    let mut categories = Vec::with_capacity(rows);
    let mut sectors = Vec::with_capacity(rows);
    let mut spend = Vec::with_capacity(rows);
    let mut last_purchase = Vec::with_capacity(rows);
    let mut signup = Vec::with_capacity(rows);
    let mut status = Vec::with_capacity(rows);

    for i in 0..rows {
        ids.push(1_000 + i as i64);
        names.push(format!("{} {}", rng.pick(&FIRST_NAMES), rng.pick(&LAST_NAMES)));
        categories.push(rng.pick(&CATEGORIES));
        sectors.push(rng.pick(&SECTORS));

        let signed_up = reference - Duration::days(30 + rng.below(3 * 365) as i64);
        signup.push(days_since_epoch(signed_up));

        // Roughly one customer in eight has never bought anything.
        if rng.below(8) == 0 {
            last_purchase.push(None);
            spend.push(0.0);
        } else {
            let since = (reference - signed_up).num_days().max(1) as usize;
            let bought = reference - Duration::days(rng.below(since) as i64);
            last_purchase.push(Some(days_since_epoch(bought)));
            spend.push((rng.unit() * 5_000.0 * 100.0).round() / 100.0);
        }
        status.push(rng.pick(&STATUSES));
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("id_cliente", DataType::Int64, false),
        Field::new("nome", DataType::Utf8, false),
        Field::new("categoria", DataType::Utf8, false),
        Field::new("setor", DataType::Utf8, false),
        Field::new("valor_gasto", DataType::Float64, false),
        Field::new("data_ultima_compra", DataType::Date32, true),
        Field::new("data_cadastro", DataType::Date32, false),
        Field::new("status", DataType::Utf8, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(categories)),
        Arc::new(StringArray::from(sectors)),
        Arc::new(Float64Array::from(spend)),
        Arc::new(Date32Array::from(last_purchase)),
        Arc::new(Date32Array::from(signup)),
        Arc::new(StringArray::from(status)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    arrow::util::pretty::print_batches(&[batch.slice(0, rows.min(5))])
        .context("printing preview")?;

    log::info!("writing {rows} rows to {output_path}");
    let file = File::create(&output_path)
        .with_context(|| format!("creating {output_path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;

    println!("Wrote {rows} customers to {output_path}");
    Ok(())
}
