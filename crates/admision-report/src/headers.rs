//! Header normalisation and tolerant column lookup.

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::error::ReportError;

/// Minimum similarity for a fuzzy header match.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// Lowercase, strip Spanish accents and drop anything that is not alphanumeric.
pub fn normalize_header(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Column positions of a header row, looked up by alias.
///
/// Lookup order: verbatim match (trimmed, case-insensitive), then
/// normalised match, then the most similar header at or above
/// [`FUZZY_THRESHOLD`].
///
/// Headers reserved with [`reserving`](Self::reserving) only answer to their
/// own name; the normalised and fuzzy tiers never hand them out for another
/// column.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    raw: Vec<String>,
    normalized: Vec<String>,
    reserved: Vec<bool>,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        Self {
            raw: headers.iter().map(|h| h.trim().to_lowercase()).collect(),
            normalized: headers.iter().map(|h| normalize_header(h)).collect(),
            reserved: vec![false; headers.len()],
        }
    }

    /// Reserve every header that is verbatim one of `known`.
    pub fn reserving(mut self, known: &[&str]) -> Self {
        let known: Vec<String> = known.iter().map(|k| k.trim().to_lowercase()).collect();
        for (i, header) in self.raw.iter().enumerate() {
            if known.contains(header) {
                self.reserved[i] = true;
            }
        }
        self
    }

    pub fn locate(&self, aliases: &[&str]) -> Option<usize> {
        let verbatim: Vec<String> = aliases.iter().map(|a| a.trim().to_lowercase()).collect();
        for wanted in &verbatim {
            if let Some(i) = self.raw.iter().position(|h| h == wanted) {
                return Some(i);
            }
        }
        // verbatim aliases already failed, so a reserved header belongs to
        // some other column
        let open = |i: usize| !self.reserved[i];

        let wanted: Vec<String> = aliases
            .iter()
            .map(|a| normalize_header(a))
            .filter(|a| !a.is_empty())
            .collect();
        for alias in &wanted {
            let found = (0..self.normalized.len()).find(|&i| open(i) && self.normalized[i] == *alias);
            if let Some(i) = found {
                return Some(i);
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, header) in self.normalized.iter().enumerate() {
            if header.is_empty() || !open(i) {
                continue;
            }
            for alias in &wanted {
                let score = normalized_levenshtein(header, alias).max(jaro_winkler(header, alias));
                if score >= FUZZY_THRESHOLD && best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }
        }
        if let Some((i, score)) = best {
            tracing::debug!(alias = aliases[0], column = i, score, "fuzzy header match");
        }
        best.map(|(i, _)| i)
    }

    /// Like [`locate`](Self::locate) but reports the missing column.
    pub fn require(&self, sheet: &str, aliases: &[&str]) -> Result<usize, ReportError> {
        self.locate(aliases)
            .ok_or_else(|| ReportError::MissingColumn {
                sheet: sheet.to_string(),
                column: aliases.first().copied().unwrap_or_default().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(headers: &[&str]) -> HeaderIndex {
        HeaderIndex::new(&headers.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn normalizes_accents_and_symbols() {
        assert_eq!(normalize_header("Programa Académico"), "programaacademico");
        assert_eq!(normalize_header("  Código de Matrícula "), "codigodematricula");
        assert_eq!(normalize_header("% (CTA/CCSS)"), "ctaccss");
        assert_eq!(normalize_header("Año"), "ano");
        assert_eq!(normalize_header("%_TOTAL"), "total");
    }

    #[test]
    fn verbatim_match_wins_over_normalized_collisions() {
        let idx = index(&["TOTAL", "%_TOTAL", "MATEMÁTICA", "MATEMATICA"]);
        assert_eq!(idx.locate(&["%_TOTAL"]), Some(1));
        assert_eq!(idx.locate(&["TOTAL"]), Some(0));
        assert_eq!(idx.locate(&["MATEMATICA"]), Some(3));
        assert_eq!(idx.locate(&["matemática"]), Some(2));
    }

    #[test]
    fn normalized_match() {
        let idx = index(&["Apellido(s)", "PROGRAMA ACADEMICO", "sede o filial"]);
        assert_eq!(idx.locate(&["Programa Académico"]), Some(1));
        assert_eq!(idx.locate(&["Sede o Filial"]), Some(2));
        assert_eq!(idx.locate(&["Apellidos", "Apellido(s)"]), Some(0));
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let idx = index(&["Numero de DNI", "Direccion de corre"]);
        assert_eq!(idx.locate(&["Número de DNI"]), Some(0));
        assert_eq!(idx.locate(&["Dirección de correo"]), Some(1));
        assert_eq!(idx.locate(&["Teléfono"]), None);
    }

    #[test]
    fn reserved_headers_only_match_their_own_name() {
        let known = [
            "COMUNICACIÓN",
            "COMUNICACIÓN.1",
            "MATEMÁTICA",
            "MATEMATICA",
            "TOTAL",
            "%_TOTAL",
        ];
        let idx = index(&["COMUNICACIÓN.1", "MATEMATICA", "%_TOTAL"]).reserving(&known);
        assert_eq!(idx.locate(&["COMUNICACIÓN"]), None);
        assert_eq!(idx.locate(&["MATEMÁTICA"]), None);
        assert_eq!(idx.locate(&["TOTAL"]), None);
        assert_eq!(idx.locate(&["comunicación.1"]), Some(0));
        assert_eq!(idx.locate(&["MATEMATICA"]), Some(1));

        // without the reservation the label column is taken for the points
        let open = index(&["COMUNICACIÓN.1"]);
        assert_eq!(open.locate(&["COMUNICACIÓN"]), Some(0));
    }

    #[test]
    fn reserving_keeps_tolerance_for_unknown_headers() {
        let idx =
            index(&["Programa  Academico", "COMUNICACIÓN.1"]).reserving(&["COMUNICACIÓN.1"]);
        assert_eq!(idx.locate(&["Programa Académico"]), Some(0));
    }

    #[test]
    fn require_reports_missing_column() {
        let idx = index(&["DNI"]);
        let err = idx.require("RESUMEN", &["Sede o Filial"]).unwrap_err();
        assert_eq!(err.to_string(), "RESUMEN has no 'Sede o Filial' column");
        assert_eq!(idx.require("RESUMEN", &["dni"]).unwrap(), 0);
    }
}
