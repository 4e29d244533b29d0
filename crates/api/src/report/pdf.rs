//! Minimal PDF renderer.
//!
//! Produces a valid PDF 1.4 document from plain text lines: one Catalog,
//! a Pages tree, one Helvetica font object, and a Page + content stream
//! per chunk of lines. The artefact is deliberately plain; the report's
//! substance lives in the text.

/// Page size: A4 in PDF points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;

/// Text layout constants.
const MARGIN: f32 = 50.0;
const FONT_SIZE: f32 = 10.0;
const LEADING: f32 = 14.0;

/// Lines that fit on one page.
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize;

/// Render text lines into PDF bytes.
pub fn render(lines: &[String]) -> Vec<u8> {
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    // Object numbering: 1 Catalog, 2 Pages, 3 Font, then for each page a
    // Page object followed by its content stream.
    let font_obj = 3u32;
    let first_page_obj = 4u32;
    let page_objs: Vec<u32> = (0..pages.len())
        .map(|i| first_page_obj + (i as u32) * 2)
        .collect();

    let mut objects: Vec<(u32, Vec<u8>)> = Vec::new();

    let kids = page_objs
        .iter()
        .map(|n| format!("{n} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push((1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()));
    objects.push((
        2,
        format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            pages.len()
        )
        .into_bytes(),
    ));
    objects.push((
        font_obj,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    ));

    for (index, page_lines) in pages.iter().enumerate() {
        let page_obj = page_objs[index];
        let content_obj = page_obj + 1;

        objects.push((
            page_obj,
            format!(
                "<< /Type /Page /Parent 2 0 R \
                 /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 {font_obj} 0 R >> >> \
                 /Contents {content_obj} 0 R >>"
            )
            .into_bytes(),
        ));

        let stream = content_stream(page_lines);
        let mut body = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        body.extend_from_slice(&stream);
        body.extend_from_slice(b"\nendstream");
        objects.push((content_obj, body));
    }

    assemble(&objects)
}

/// Build the text-drawing content stream for one page.
fn content_stream(lines: &[String]) -> Vec<u8> {
    let start_y = PAGE_HEIGHT - MARGIN;
    let mut out = format!(
        "BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {start_y} Td\n"
    );
    for line in lines {
        out.push('(');
        out.push_str(&escape_text(line));
        out.push_str(") Tj\nT*\n");
    }
    out.push_str("ET");
    out.into_bytes()
}

/// Escape the characters PDF string literals reserve.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            // Helvetica with the default encoding only covers Latin-1;
            // anything else degrades to '?'.
            c if (c as u32) < 256 => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// Serialise numbered objects with a correct xref table and trailer.
fn assemble(objects: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets: Vec<(u32, usize)> = Vec::with_capacity(objects.len());

    for (number, body) in objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let count = objects.len() + 1;
    out.extend_from_slice(format!("xref\n0 {count}\n").as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");

    let mut sorted = offsets.clone();
    sorted.sort_by_key(|(number, _)| *number);
    for (_, offset) in &sorted {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }

    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {count} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        )
        .as_bytes(),
    );
    out
}
