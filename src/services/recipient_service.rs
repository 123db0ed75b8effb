//! services/recipient_service.rs
//! Validación, deduplicación y parseo de listas de destinatarios.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::recipient_model::{RawRecipient, Recipient, SanitizedRecipients};

lazy_static! {
    /// Solo formas `local@dominio.tld` con caracteres comunes. Los puntos
    /// del local-part van entre segmentos, como exige lettre al enviar.
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"^[a-z0-9_+'\-]+(\.[a-z0-9_+'\-]+)*@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]{2,}$"
    )
    .expect("EMAIL_PATTERN es una regex válida");
}

pub fn is_valid_address(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

/// Normaliza, valida y quita duplicados manteniendo el orden de aparición.
/// Los inválidos y repetidos se descartan sin error; solo se cuentan.
pub fn sanitize_recipients<I>(raw: I) -> SanitizedRecipients
where
    I: IntoIterator<Item = RawRecipient>,
{
    let mut seen = HashSet::new();
    let mut result = SanitizedRecipients::default();

    for entry in raw {
        let address = entry.address.trim().to_lowercase();
        if !is_valid_address(&address) {
            result.invalid_dropped += 1;
            continue;
        }
        if !seen.insert(address.clone()) {
            result.duplicate_dropped += 1;
            continue;
        }

        let name = entry
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        result.recipients.push(Recipient { address, name });
    }

    result
}

/// Texto pegado: una dirección por línea.
pub fn parse_pasted_text(text: &str) -> Vec<RawRecipient> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(RawRecipient::from)
        .collect()
}

/// Tabla (CSV, `;` o tab): primera columna dirección, segunda nombre opcional.
/// Las celdas entre comillas pueden contener separadores y `""` escapado.
/// Una cabecera sin `@` en la primera celda se ignora.
pub fn parse_tabular(text: &str) -> Vec<RawRecipient> {
    let mut out = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let mut cells = split_row(line).into_iter();
        let address = cells.next().unwrap_or_default();
        if idx == 0 && !address.contains('@') {
            continue;
        }

        let name = cells.next().filter(|n| !n.is_empty());
        out.push(RawRecipient { address, name });
    }

    out
}

fn is_separator(c: char) -> bool {
    matches!(c, ',' | ';' | '\t')
}

/// Parte una fila respetando comillas dobles. Las celdas salen recortadas.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if !in_quotes && is_separator(c) => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}
