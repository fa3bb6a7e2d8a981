// ============================================================================
// SERVICE : CERTIFICATS PDF
// ============================================================================
//
// Description:
//   Rend le certificat de complétion d'un projet capstone : une page PDF A4
//   paysage, texte centré en Helvetica (polices standard PDF, rien à
//   embarquer).
//
// Contenu:
//   - en-tête de l'académie + "CERTIFICATE OF COMPLETION"
//   - étudiant, projet, cours, date de complétion, note (si présente)
//   - signatures Course Director / Course Instructor
//   - identifiant CERT-<id>-<YYYYMMDD>
//
// Points d'attention:
//   - Caractères hors Latin-1 remplacés par '?' (WinAnsiEncoding)
//   - Un échec de rendu n'annule pas la complétion du projet (cf.
//     project_service) : il est loggé et le certificat reste vide
//
// ============================================================================

use chrono::NaiveDate;
use std::fmt::Write;
use thiserror::Error;

/// A4 paysage, en points
const PAGE_WIDTH: f64 = 842.0;
const PAGE_HEIGHT: f64 = 595.0;

const PRIMARY: (f64, f64, f64) = (0.04, 0.30, 0.57);
const SECONDARY: (f64, f64, f64) = (0.95, 0.64, 0.13);
const ACCENT: (f64, f64, f64) = (0.65, 0.16, 0.94);
const TEXT: (f64, f64, f64) = (0.2, 0.2, 0.2);

pub const TAGLINE: &str = "Equipping Africa with Future-Ready Data Skills";

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate field '{0}' is empty")]
    MissingField(&'static str),

    #[error("failed to write certificate content")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone)]
pub struct CertificateData {
    pub academy_name: String,
    pub student_name: String,
    pub project_title: String,
    pub course_title: String,
    pub completion_date: NaiveDate,
    pub grade: Option<i32>,
    pub director_name: String,
    pub instructor_name: String,
    pub certificate_id: String,
}

pub fn certificate_id(project_enrollment_id: i32, issued_on: NaiveDate) -> String {
    format!("CERT-{}-{}", project_enrollment_id, issued_on.format("%Y%m%d"))
}

pub fn certificate_filename(username: &str, project_id: i32, issued_on: NaiveDate) -> String {
    format!("certificate_{}_{}_{}.pdf", username, project_id, issued_on.format("%Y%m%d"))
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    /// Largeur moyenne d'un glyphe Helvetica en fraction de la taille
    fn avg_width(&self) -> f64 {
        match self {
            Font::Regular => 0.52,
            Font::Bold => 0.56,
        }
    }
}

struct Line<'a> {
    text: &'a str,
    font: Font,
    size: f64,
    color: (f64, f64, f64),
    x_center: f64,
    y: f64,
}

pub fn render_certificate(data: &CertificateData) -> Result<Vec<u8>, CertificateError> {
    for (field, value) in [
        ("student_name", &data.student_name),
        ("project_title", &data.project_title),
        ("course_title", &data.course_title),
        ("certificate_id", &data.certificate_id),
    ] {
        if value.trim().is_empty() {
            return Err(CertificateError::MissingField(field));
        }
    }

    let header = data.academy_name.to_uppercase();
    let project = format!("\"{}\"", data.project_title);
    let program = format!("as part of the {} program", data.course_title);
    let completed = format!("Completed on {}", data.completion_date.format("%B %d, %Y"));
    let grade = data.grade.map(|g| format!("Grade: {}%", g));
    let footer_id = format!("Certificate ID: {}", data.certificate_id);

    let center = PAGE_WIDTH / 2.0;
    let left_col = PAGE_WIDTH / 2.0 - 180.0;
    let right_col = PAGE_WIDTH / 2.0 + 180.0;

    let mut lines = vec![
        Line { text: &header, font: Font::Bold, size: 36.0, color: PRIMARY, x_center: center, y: 510.0 },
        Line { text: "CERTIFICATE OF COMPLETION", font: Font::Bold, size: 24.0, color: SECONDARY, x_center: center, y: 468.0 },
        Line { text: "This is to certify that", font: Font::Regular, size: 16.0, color: TEXT, x_center: center, y: 420.0 },
        Line { text: &data.student_name, font: Font::Bold, size: 28.0, color: PRIMARY, x_center: center, y: 382.0 },
        Line { text: "has successfully completed the capstone project", font: Font::Regular, size: 16.0, color: TEXT, x_center: center, y: 348.0 },
        Line { text: &project, font: Font::Bold, size: 20.0, color: ACCENT, x_center: center, y: 316.0 },
        Line { text: &program, font: Font::Regular, size: 16.0, color: TEXT, x_center: center, y: 288.0 },
        Line { text: &completed, font: Font::Regular, size: 16.0, color: TEXT, x_center: center, y: 262.0 },
    ];
    if let Some(grade) = grade.as_deref() {
        lines.push(Line { text: grade, font: Font::Regular, size: 16.0, color: TEXT, x_center: center, y: 238.0 });
    }

    // Signatures
    for (x, title, name) in [
        (left_col, "Course Director", data.director_name.as_str()),
        (right_col, "Course Instructor", data.instructor_name.as_str()),
    ] {
        lines.push(Line { text: title, font: Font::Bold, size: 12.0, color: TEXT, x_center: x, y: 190.0 });
        lines.push(Line { text: name, font: Font::Bold, size: 12.0, color: TEXT, x_center: x, y: 172.0 });
        lines.push(Line { text: "________________", font: Font::Regular, size: 12.0, color: TEXT, x_center: x, y: 138.0 });
        lines.push(Line { text: "Signature and Stamp", font: Font::Regular, size: 12.0, color: TEXT, x_center: x, y: 120.0 });
    }

    lines.push(Line { text: &footer_id, font: Font::Regular, size: 10.0, color: TEXT, x_center: center, y: 70.0 });
    lines.push(Line { text: TAGLINE, font: Font::Regular, size: 10.0, color: TEXT, x_center: center, y: 56.0 });

    let content = content_stream(&lines)?;
    build_document(&content)
}

fn content_stream(lines: &[Line<'_>]) -> Result<String, CertificateError> {
    let mut out = String::new();

    // Cadre
    writeln!(out, "{:.2} {:.2} {:.2} RG 3 w", PRIMARY.0, PRIMARY.1, PRIMARY.2)?;
    writeln!(out, "24 24 {} {} re S", PAGE_WIDTH - 48.0, PAGE_HEIGHT - 48.0)?;
    writeln!(out, "{:.2} {:.2} {:.2} RG 1 w", SECONDARY.0, SECONDARY.1, SECONDARY.2)?;
    writeln!(out, "32 32 {} {} re S", PAGE_WIDTH - 64.0, PAGE_HEIGHT - 64.0)?;

    for line in lines {
        let encoded = encode_text(line.text);
        let width = encoded.glyphs as f64 * line.size * line.font.avg_width();
        let x = (line.x_center - width / 2.0).max(40.0);
        writeln!(out, "BT")?;
        writeln!(out, "{:.2} {:.2} {:.2} rg", line.color.0, line.color.1, line.color.2)?;
        writeln!(out, "/{} {} Tf", line.font.resource(), line.size)?;
        writeln!(out, "{:.1} {:.1} Td", x, line.y)?;
        writeln!(out, "({}) Tj", encoded.escaped)?;
        writeln!(out, "ET")?;
    }

    Ok(out)
}

struct EncodedText {
    escaped: String,
    glyphs: usize,
}

/// Chaîne littérale PDF : échappe \ ( ) et passe le Latin-1 en octal
fn encode_text(text: &str) -> EncodedText {
    let mut escaped = String::with_capacity(text.len());
    let mut glyphs = 0;

    for c in text.chars() {
        glyphs += 1;
        match c {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            c if (c as u32) >= 0xA0 && (c as u32) <= 0xFF => {
                escaped.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => escaped.push('?'),
        }
    }

    EncodedText { escaped, glyphs }
}

/// Assemble les objets PDF et la table xref
fn build_document(content: &str) -> Result<Vec<u8>, CertificateError> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());

    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        write!(pdf, "{} 0 obj\n{}\nendobj\n", index + 1, body)?;
    }

    let xref_offset = pdf.len();
    writeln!(pdf, "xref\n0 {}", objects.len() + 1)?;
    writeln!(pdf, "0000000000 65535 f ")?;
    for offset in offsets {
        writeln!(pdf, "{:010} 00000 n ", offset)?;
    }
    write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    )?;

    Ok(pdf.into_bytes())
}
