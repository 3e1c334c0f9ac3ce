//! Text extraction for staged uploads.
//!
//! The format is chosen from the declared file name's extension. Names
//! without a recognised extension (reconciled objects are named after their
//! key) fall back to content sniffing: PDF and OOXML by magic bytes, then
//! plain text unless the leading bytes look binary.
//!
//! Text is decoded as UTF-8, falling back to windows-1252 when the bytes are
//! not valid UTF-8. Structured text formats keep only their values: CSV
//! fields, YAML scalars, `key = value` right-hand sides, SQL without
//! comments.

use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// How many leading bytes are inspected by the binary heuristic.
const SNIFF_BYTES: usize = 1024;
/// Share of NUL or control bytes above which content is treated as binary.
const BINARY_RATIO: f64 = 0.3;
/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read staged file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Csv,
    Yaml,
    /// `key = value` files: TOML, INI and friends.
    KeyValue,
    Sql,
    Markdown,
    Json,
    Markup,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Unknown,
}

impl Format {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "log" | "text" => Format::Text,
            "csv" => Format::Csv,
            "yaml" | "yml" => Format::Yaml,
            "toml" | "ini" | "cfg" | "conf" => Format::KeyValue,
            "sql" => Format::Sql,
            "md" | "markdown" => Format::Markdown,
            "json" => Format::Json,
            "xml" | "html" | "htm" => Format::Markup,
            "pdf" => Format::Pdf,
            "docx" => Format::Docx,
            "pptx" => Format::Pptx,
            "xlsx" => Format::Xlsx,
            _ => Format::Unknown,
        }
    }
}

/// Read a staged file and extract its indexable text.
pub fn extract_file(path: &Path, name: &str) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes, name)
}

pub fn extract_bytes(bytes: &[u8], name: &str) -> Result<String, ExtractError> {
    let format = match Format::from_name(name) {
        Format::Unknown => sniff(bytes),
        known => known,
    };

    match format {
        Format::Text => Ok(decode_text(bytes)),
        Format::Csv => Ok(extract_csv(&decode_text(bytes))),
        Format::Yaml => Ok(extract_yaml(&decode_text(bytes))),
        Format::KeyValue => Ok(extract_key_values(&decode_text(bytes))),
        Format::Sql => Ok(strip_sql_comments(&decode_text(bytes))),
        Format::Markdown => Ok(strip_markdown(&decode_text(bytes))),
        Format::Json => Ok(extract_json(bytes)),
        Format::Markup => Ok(extract_markup(bytes)),
        Format::Pdf => extract_pdf(bytes),
        Format::Docx => extract_docx(bytes),
        Format::Pptx => extract_pptx(bytes),
        Format::Xlsx => extract_xlsx(bytes),
        Format::Unknown => Ok(format!("[Binary file: {}]", display_name(name))),
    }
}

/// Guess a format for content whose name carries no usable extension.
fn sniff(bytes: &[u8]) -> Format {
    if bytes.starts_with(b"%PDF-") {
        return Format::Pdf;
    }
    if bytes.starts_with(b"PK\x03\x04") {
        if let Ok(archive) = zip::ZipArchive::new(std::io::Cursor::new(bytes)) {
            let mut names = archive.file_names();
            if let Some(kind) = names.find_map(|n| {
                if n == "word/document.xml" {
                    Some(Format::Docx)
                } else if n.starts_with("ppt/slides/") {
                    Some(Format::Pptx)
                } else if n.starts_with("xl/worksheets/") {
                    Some(Format::Xlsx)
                } else {
                    None
                }
            }) {
                return kind;
            }
        }
        return Format::Unknown;
    }
    if looks_binary(bytes) {
        Format::Unknown
    } else {
        Format::Text
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_BYTES)];
    if head.is_empty() {
        return false;
    }
    let nul = head.iter().filter(|&&b| b == 0).count();
    let control = head
        .iter()
        .filter(|&&b| b < 32 && !matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    let total = head.len() as f64;
    nul as f64 / total > BINARY_RATIO || control as f64 / total > BINARY_RATIO
}

fn display_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("binary_file")
}

fn decode_text(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Non-empty results of `f` over each line, one per line.
fn filter_lines<F>(text: &str, f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    text.lines().filter_map(f).collect::<Vec<_>>().join("\n")
}

fn strip_quotes(val: &str) -> &str {
    val.trim().trim_matches('"').trim_matches('\'')
}

// ============ CSV ============

/// Header and record fields joined by spaces, one row per line. Ragged rows
/// are accepted; unparseable ones are skipped.
fn extract_csv(text: &str) -> String {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    if let Ok(headers) = reader.headers() {
        rows.push(headers.iter().collect::<Vec<_>>().join(" "));
    }
    for record in reader.records().flatten() {
        rows.push(record.iter().collect::<Vec<_>>().join(" "));
    }
    rows.join("\n")
}

// ============ YAML / key-value ============

/// Scalar values of `key: value` lines. Inline lists and maps are dropped.
fn extract_yaml(text: &str) -> String {
    filter_lines(text, |line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (_, val) = line.split_once(':')?;
        let val = strip_quotes(val);
        if val.is_empty() || val.starts_with('[') || val.starts_with('{') {
            None
        } else {
            Some(val.to_string())
        }
    })
}

/// Right-hand sides of `key = value` lines; `#` and `;` start comments.
fn extract_key_values(text: &str) -> String {
    filter_lines(text, |line| {
        let line = line.split('#').next().unwrap_or("");
        let line = line.split(';').next().unwrap_or("").trim();
        let (_, val) = line.split_once('=')?;
        let val = strip_quotes(val);
        (!val.is_empty()).then(|| val.to_string())
    })
}

// ============ SQL ============

/// Statements with `--` and `/* */` comments removed, blank lines dropped.
fn strip_sql_comments(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_block = false;

    for line in text.lines() {
        let mut line = line.to_string();

        if in_block {
            match line.find("*/") {
                Some(end) => {
                    line.replace_range(..end + 2, "");
                    in_block = false;
                }
                None => continue,
            }
        }

        while let Some(start) = line.find("/*") {
            match line[start + 2..].find("*/") {
                Some(end) => line.replace_range(start..start + 2 + end + 2, ""),
                None => {
                    line.truncate(start);
                    in_block = true;
                    break;
                }
            }
        }

        if let Some(pos) = line.find("--") {
            line.truncate(pos);
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out.join("\n")
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(tidy_pdf_text(&text))
}

/// Trimmed lines with blank ones dropped.
fn tidy_pdf_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ Markdown ============

fn strip_markdown(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = line.trim_start().trim_start_matches('#').trim_start();
            let line = strip_links(line);
            line.replace("**", "").replace(['*', '`'], "")
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[label](target)` becomes `label`.
fn strip_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let after_open = &rest[open + 1..];
        let link = after_open.find("](").and_then(|mid| {
            let label = &after_open[..mid];
            if label.contains('[') {
                return None;
            }
            after_open[mid + 2..]
                .find(')')
                .map(|close| (label, mid + 2 + close + 1))
        });
        match link {
            Some((label, consumed)) => {
                out.push_str(&rest[..open]);
                out.push_str(label);
                rest = &after_open[consumed..];
            }
            None => {
                out.push_str(&rest[..open + 1]);
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

// ============ JSON ============

fn extract_json(bytes: &[u8]) -> String {
    let text = decode_text(bytes);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => {
            let mut parts = Vec::new();
            collect_json_strings(&value, &mut parts);
            parts.join(" ")
        }
        Err(_) => text,
    }
}

fn collect_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_json_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_json_strings(v, out)),
        _ => {}
    }
}

// ============ XML / HTML ============

/// Text nodes joined by spaces. Malformed markup keeps whatever was read
/// before the first error.
fn extract_markup(bytes: &[u8]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if matches!(e.local_name().as_ref(), b"script" | b"style") {
                    skip_depth += 1;
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if matches!(e.local_name().as_ref(), b"script" | b"style") {
                    skip_depth = skip_depth.saturating_sub(1);
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if skip_depth == 0 => {
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Ok(quick_xml::events::Event::CData(c)) if skip_depth == 0 => {
                parts.push(String::from_utf8_lossy(&c).into_owned());
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    parts.join(" ")
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries under `prefix` named `<prefix>N.xml`, in numeric order.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenated text of every `<*:t>` element (`w:t` in Word, `a:t` in slides).
fn collect_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_t = true;
            }
            Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"t" => {
                in_t = false;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    collect_t_elements(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_t_elements(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join(" "))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = extract_sheet_cells(&xml, &shared_strings)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join(" "))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(ref mut s) = current {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Shared-string and inline-number cell values of one worksheet.
fn extract_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut shared = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => shared = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
