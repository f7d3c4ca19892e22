#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use segment_dash::config::{ColumnsConfig, DashboardConfig, LimitsConfig};
use segment_dash::data::engine::DuckEngine;
use segment_dash::data::filter::ColumnMap;
use segment_dash::data::loader;
use segment_dash::data::model::DatasetHandle;
use segment_dash::data::query::QueryExecutor;
use tempfile::TempDir;

/// Ten customers. Category A has four rows; rows 4 and 8 have no purchase
/// date; row 10 has no status.
pub const CUSTOMERS_CSV: &str = "\
id_cliente,nome,categoria,setor,valor_gasto,data_ultima_compra,data_cadastro,status
1,Ana Silva,A,Varejo,100.50,2025-06-20,2023-01-10,ativo
2,Bruno Souza,A,Tecnologia,250.00,2025-05-01,2023-02-15,ativo
3,Carla Lima,B,Varejo,80.00,2025-01-15,2022-11-01,inativo
4,Diego Costa,A,Saúde,0.00,,2024-03-05,prospecto
5,Elisa Santos,C,Varejo,500.00,2024-12-01,2022-06-20,ativo
6,Felipe Lima,B,Tecnologia,75.25,2024-04-10,2021-09-09,inativo
7,Gabriela Costa,A,Varejo,320.00,2023-08-30,2021-01-01,ativo
8,Hugo Pereira,C,Saúde,60.00,,2024-07-07,prospecto
9,Isabela Souza,B,Educação,410.00,2025-06-01,2022-03-03,ativo
10,João Almeida,C,Varejo,90.00,2025-03-20,2023-05-05,
";

pub const TOTAL_ROWS: u64 = 10;

/// Reference "today" for recency figures.
pub fn today() -> NaiveDate {
    date(2025, 6, 30)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Fixture {
    pub dir: TempDir,
    pub csv: PathBuf,
    pub parquet: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("clientes.csv");
        fs::write(&csv, CUSTOMERS_CSV).unwrap();
        let parquet = dir.path().join("clientes.parquet");
        write_parquet(&parquet);
        Self { dir, csv, parquet }
    }
}

/// Handle, executor and resolved columns over `path`, with default limits.
pub fn open(path: &Path) -> (DatasetHandle, QueryExecutor<DuckEngine>, ColumnMap) {
    open_with(path, &LimitsConfig::default())
}

pub fn open_with(
    path: &Path,
    limits: &LimitsConfig,
) -> (DatasetHandle, QueryExecutor<DuckEngine>, ColumnMap) {
    let mut handle = loader::inspect(path).unwrap();
    let engine = DuckEngine::open(&handle.path, handle.format).unwrap();
    let executor = QueryExecutor::new(engine, limits);
    executor.resolve_column_kinds(&mut handle).unwrap();
    let columns = ColumnMap::resolve(&ColumnsConfig::default(), &handle);
    (handle, executor, columns)
}

pub fn local_config(path: &Path) -> DashboardConfig {
    let mut config = DashboardConfig::default();
    config.source.local_path = Some(path.to_path_buf());
    config
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn days(d: NaiveDate) -> i32 {
    (d - date(1970, 1, 1)).num_days() as i32
}

fn write_parquet(path: &Path) {
    let mut reader = csv::Reader::from_reader(CUSTOMERS_CSV.as_bytes());
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    let text = |i: usize| -> Vec<Option<String>> {
        records
            .iter()
            .map(|r| Some(r[i].to_string()).filter(|s| !s.is_empty()))
            .collect()
    };
    let day = |i: usize| -> Vec<Option<i32>> {
        records
            .iter()
            .map(|r| NaiveDate::parse_from_str(&r[i], "%Y-%m-%d").ok().map(days))
            .collect()
    };

    let schema = Arc::new(Schema::new(vec![
        Field::new("id_cliente", DataType::Int64, false),
        Field::new("nome", DataType::Utf8, false),
        Field::new("categoria", DataType::Utf8, false),
        Field::new("setor", DataType::Utf8, false),
        Field::new("valor_gasto", DataType::Float64, false),
        Field::new("data_ultima_compra", DataType::Date32, true),
        Field::new("data_cadastro", DataType::Date32, false),
        Field::new("status", DataType::Utf8, true),
    ]));
    let ids: Vec<i64> = records.iter().map(|r| r[0].parse().unwrap()).collect();
    let spend: Vec<f64> = records.iter().map(|r| r[4].parse().unwrap()).collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(StringArray::from(text(1))),
        Arc::new(StringArray::from(text(2))),
        Arc::new(StringArray::from(text(3))),
        Arc::new(Float64Array::from(spend)),
        Arc::new(Date32Array::from(day(5))),
        Arc::new(Date32Array::from(day(6))),
        Arc::new(StringArray::from(text(7))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}
