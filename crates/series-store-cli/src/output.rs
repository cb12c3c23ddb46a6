use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use arrow::{csv, json};
use series_store_core::{RowSet, formats::parquet::to_record_batch};
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{ArrowSnafu, CliResult, StdoutSnafu, WriteOutputSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Jsonl,
}

#[derive(Debug, Clone)]
pub struct ReadOpts {
    pub max_rows: usize,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

#[derive(Debug, Clone)]
pub struct ReadResult {
    pub columns: Vec<String>,
    pub preview_rows: Vec<Vec<String>>,
    pub total_rows: u64,
}

impl ReadResult {
    /// Preview the first `max_rows` rows; absent values render empty.
    pub fn from_rows(rows: &RowSet, max_rows: usize) -> Self {
        let mut columns = Vec::with_capacity(rows.fields().len() + 1);
        columns.push("ts".to_string());
        columns.extend(rows.fields().iter().cloned());

        let preview_rows = rows
            .rows()
            .iter()
            .take(max_rows)
            .map(|row| {
                let mut cells = Vec::with_capacity(columns.len());
                cells.push(row.ts.to_rfc3339());
                cells.extend(
                    rows.fields()
                        .iter()
                        .map(|f| row.get(f).map(|v| v.to_string()).unwrap_or_default()),
                );
                cells
            })
            .collect();

        ReadResult {
            columns,
            preview_rows,
            total_rows: rows.len() as u64,
        }
    }
}

fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    const PREVIEW_LABEL: &str = "Preview output";
    const PREVIEW_OFFSET: usize = 6;
    let min_width = PREVIEW_OFFSET + PREVIEW_LABEL.len() + 4;

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();

    table.with(Style::rounded());
    table.with(MinWidth::new(min_width));
    table.with(LineText::new(PREVIEW_LABEL, Rows::first()).offset(PREVIEW_OFFSET));
    // LineText re-estimates dimensions, so re-apply MinWidth afterwards.
    table.with(MinWidth::new(min_width));
    table.to_string()
}

fn preview_message(res: &ReadResult, opts: &ReadOpts) -> Option<String> {
    if opts.max_rows == 0 && res.total_rows > 0 {
        return Some("(preview suppressed; use --max-rows > 0)".to_string());
    }

    if res.total_rows == 0 {
        return Some("(no rows)".to_string());
    }

    None
}

pub fn write_read_result<W: Write>(res: &ReadResult, opts: &ReadOpts, out: &mut W) -> CliResult<()> {
    if !res.preview_rows.is_empty() || opts.max_rows == 0 {
        let rendered = render_table(&res.columns, &res.preview_rows);
        writeln!(out, "{rendered}").context(StdoutSnafu)?;
    }

    if let Some(message) = preview_message(res, opts) {
        writeln!(out, "{message}").context(StdoutSnafu)?;
    }

    writeln!(out, "total_rows: {}", res.total_rows).context(StdoutSnafu)?;

    if let Some(path) = &opts.output {
        writeln!(out, "wrote: {} ({:?})", path.display(), opts.format).context(StdoutSnafu)?;
    }
    Ok(())
}

pub fn print_read_result(res: &ReadResult, opts: &ReadOpts) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    write_read_result(res, opts, &mut stdout)
}

/// Write every row to `path` in `format`.
pub fn write_rows_file(rows: &RowSet, path: &Path, format: OutputFormat) -> CliResult<()> {
    let batch = to_record_batch(rows).context(ArrowSnafu)?;
    let file = File::create(path).context(WriteOutputSnafu { path })?;
    let mut sink = BufWriter::new(file);

    match format {
        OutputFormat::Csv => {
            let mut writer = csv::WriterBuilder::new().with_header(true).build(&mut sink);
            writer.write(&batch).context(ArrowSnafu)?;
        }
        OutputFormat::Jsonl => {
            let mut writer = json::LineDelimitedWriter::new(&mut sink);
            writer.write_batches(&[&batch]).context(ArrowSnafu)?;
            writer.finish().context(ArrowSnafu)?;
        }
    }

    sink.flush().context(WriteOutputSnafu { path })?;
    Ok(())
}
