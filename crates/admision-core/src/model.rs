//! Core data model types for admission exports.
//!
//! Areas, subjects and their fixed question ranges, plus the platform-side
//! entities (students, quizzes, attempts, reviews) the export works on.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of question slots in every admission exam.
pub const MAX_QUESTIONS: usize = 100;

/// Profile field shortnames (upper-cased) read from the platform.
pub const CF_DNI: &str = "DNI_CE";
pub const CF_PROGRAMA: &str = "PROGRAMA_ACADEMICO";
pub const CF_SEDE: &str = "SEDE_FILIAL";
pub const CF_CODIGO_MATRICULA: &str = "CODIGO_DE_MATRICULA";

/// Admission track. Decides which question ranges belong to which subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Area {
    A,
    B,
    C,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::A, Area::B, Area::C];

    /// Fixed question layout for this area.
    pub fn definition(self) -> AreaDefinition {
        match self {
            Area::A => AreaDefinition {
                area: self,
                label: "AREA-A INGENIERÍAS",
                cta_label: "CIENCIA TECNOLOGÍA Y AMBIENTE",
                ranges: [
                    (Subject::Comunicacion, vec![1..=21, 97..=100]),
                    (Subject::Matematica, vec![22..=71]),
                    (Subject::HabilidadesComunicativas, vec![72..=81]),
                    (Subject::CtaCcss, vec![82..=96]),
                ],
            },
            Area::B => AreaDefinition {
                area: self,
                label: "AREA B-CIENCIAS SALUD",
                cta_label: "CIENCIA TECNOLOGÍA Y AMBIENTE",
                ranges: [
                    (Subject::Comunicacion, vec![1..=21, 97..=100]),
                    (Subject::Matematica, vec![22..=51]),
                    (Subject::HabilidadesComunicativas, vec![52..=61]),
                    (Subject::CtaCcss, vec![62..=96]),
                ],
            },
            Area::C => AreaDefinition {
                area: self,
                label: "AREA C-CIENCIAS HUMANAS",
                cta_label: "CCSS",
                ranges: [
                    (Subject::Comunicacion, vec![1..=31, 97..=100]),
                    (Subject::Matematica, vec![32..=61]),
                    (Subject::HabilidadesComunicativas, vec![62..=71]),
                    (Subject::CtaCcss, vec![72..=96]),
                ],
            },
        }
    }

    pub fn letter(self) -> char {
        match self {
            Area::A => 'A',
            Area::B => 'B',
            Area::C => 'C',
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Area {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Area::A),
            "B" => Ok(Area::B),
            "C" => Ok(Area::C),
            other => Err(ParseError::UnknownArea(other.to_string())),
        }
    }
}

impl TryFrom<String> for Area {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Area> for String {
    fn from(a: Area) -> Self {
        a.to_string()
    }
}

/// Exam subject. `CtaCcss` is CTA for areas A/B and CCSS for area C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Subject {
    Comunicacion,
    HabilidadesComunicativas,
    Matematica,
    CtaCcss,
}

impl Subject {
    /// Column order used by every sheet.
    pub const ALL: [Subject; 4] = [
        Subject::Comunicacion,
        Subject::HabilidadesComunicativas,
        Subject::Matematica,
        Subject::CtaCcss,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Subject::Comunicacion => "COMUNICACIÓN",
            Subject::HabilidadesComunicativas => "HABILIDADES COMUNICATIVAS",
            Subject::Matematica => "MATEMÁTICA",
            Subject::CtaCcss => "CTA/CCSS",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Subject::Comunicacion => "COM",
            Subject::HabilidadesComunicativas => "HAB",
            Subject::Matematica => "MAT",
            Subject::CtaCcss => "CTA/CCSS",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Subject {
    type Err = ParseError;

    /// Accepts the config keys (`matematica`, `cta_ccss`, ...) and the short tags.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "comunicacion" | "com" => Ok(Subject::Comunicacion),
            "habilidades_comunicativas" | "habilidades" | "hab" => {
                Ok(Subject::HabilidadesComunicativas)
            }
            "matematica" | "mat" => Ok(Subject::Matematica),
            "cta_ccss" | "cta" | "ccss" => Ok(Subject::CtaCcss),
            other => Err(ParseError::UnknownSubject(other.to_string())),
        }
    }
}

impl TryFrom<String> for Subject {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Subject> for String {
    fn from(s: Subject) -> Self {
        match s {
            Subject::Comunicacion => "comunicacion",
            Subject::HabilidadesComunicativas => "habilidades_comunicativas",
            Subject::Matematica => "matematica",
            Subject::CtaCcss => "cta_ccss",
        }
        .to_string()
    }
}

/// Question ranges of one area.
#[derive(Debug, Clone)]
pub struct AreaDefinition {
    pub area: Area,
    pub label: &'static str,
    pub cta_label: &'static str,
    pub ranges: [(Subject, Vec<RangeInclusive<usize>>); 4],
}

impl AreaDefinition {
    /// Question slots (1-based) that belong to `subject`.
    pub fn slots(&self, subject: Subject) -> Vec<usize> {
        self.ranges
            .iter()
            .filter(|(s, _)| *s == subject)
            .flat_map(|(_, ranges)| ranges.iter().cloned().flatten())
            .collect()
    }

    pub fn question_count(&self, subject: Subject) -> usize {
        self.ranges
            .iter()
            .filter(|(s, _)| *s == subject)
            .flat_map(|(_, ranges)| ranges.iter())
            .map(|r| r.clone().count())
            .sum()
    }
}

/// An enrolled user with the profile fields the reports need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    #[serde(default)]
    pub idnumber: String,
    /// Custom profile fields keyed by upper-cased shortname.
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl Student {
    fn custom_field(&self, key: &str) -> &str {
        self.custom.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn dni(&self) -> &str {
        self.custom_field(CF_DNI)
    }

    pub fn programa(&self) -> &str {
        self.custom_field(CF_PROGRAMA)
    }

    pub fn sede(&self) -> &str {
        self.custom_field(CF_SEDE)
    }

    pub fn codigo_matricula(&self) -> &str {
        self.custom_field(CF_CODIGO_MATRICULA)
    }
}

/// A quiz found in one of the requested courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub course_id: i64,
    pub quiz_id: i64,
    pub name: String,
}

/// A single quiz attempt. Times are epoch seconds, 0 when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub time_start: i64,
    #[serde(default)]
    pub time_finish: i64,
}

/// A mark as the platform emits it: either a number or a formatted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mark {
    Number(f64),
    Text(String),
}

impl Mark {
    /// Numeric value, accepting a comma as decimal separator.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Mark::Number(n) => Some(*n),
            Mark::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        }
    }
}

/// One question of a reviewed attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewedQuestion {
    pub slot: Option<i64>,
    pub mark: Option<Mark>,
    pub fraction: Option<f64>,
    pub maxmark: Option<f64>,
}

/// The review of an attempt: final grade and per-question marks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptReview {
    pub grade: Option<f64>,
    #[serde(default)]
    pub questions: Vec<ReviewedQuestion>,
}

/// Quiz id → area mapping supplied by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAreaMap(pub BTreeMap<i64, Area>);

impl QuizAreaMap {
    /// Parse `"11907=A,11908=B"`. Malformed pieces are skipped.
    pub fn parse(s: &str) -> Self {
        let mut out = BTreeMap::new();
        for piece in s.split(',').filter(|p| !p.trim().is_empty()) {
            let Some((left, right)) = piece.split_once('=') else {
                continue;
            };
            let left = left.trim();
            if left.is_empty() || !left.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let (Ok(quiz_id), Ok(area)) = (left.parse::<i64>(), right.parse::<Area>()) else {
                continue;
            };
            out.insert(quiz_id, area);
        }
        QuizAreaMap(out)
    }

    pub fn get(&self, quiz_id: i64) -> Option<Area> {
        self.0.get(&quiz_id).copied()
    }

    pub fn contains(&self, quiz_id: i64) -> bool {
        self.0.contains_key(&quiz_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for QuizAreaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(q, a)| format!("{q}={a}")).collect();
        f.write_str(&parts.join(","))
    }
}

/// Guess the area from a quiz name, e.g. "Examen de Admisión – Ingenierías".
pub fn guess_area_from_name(name: &str) -> Option<Area> {
    let n = name.to_lowercase();
    if n.contains("ingenier") {
        Some(Area::A)
    } else if n.contains("salud") {
        Some(Area::B)
    } else if n.contains("humana") {
        Some(Area::C)
    } else {
        None
    }
}

/// Parse a comma-separated list of course ids.
pub fn parse_course_ids(s: &str) -> Result<Vec<i64>, ParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<i64>()
                .map_err(|_| ParseError::InvalidCourseId(p.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_display_and_parse() {
        assert_eq!(Area::A.to_string(), "A");
        assert_eq!(" b ".parse::<Area>().unwrap(), Area::B);
        assert_eq!("c".parse::<Area>().unwrap(), Area::C);
        assert!("D".parse::<Area>().is_err());
    }

    #[test]
    fn subject_parse_accepts_keys_and_tags() {
        assert_eq!("cta_ccss".parse::<Subject>().unwrap(), Subject::CtaCcss);
        assert_eq!("HAB".parse::<Subject>().unwrap(), Subject::HabilidadesComunicativas);
        assert_eq!(
            "habilidades comunicativas".parse::<Subject>().unwrap(),
            Subject::HabilidadesComunicativas
        );
        assert!("fisica".parse::<Subject>().is_err());
        assert_eq!(String::from(Subject::Matematica), "matematica");
    }

    #[test]
    fn area_question_counts() {
        let a = Area::A.definition();
        assert_eq!(a.question_count(Subject::Comunicacion), 25);
        assert_eq!(a.question_count(Subject::Matematica), 50);
        assert_eq!(a.question_count(Subject::HabilidadesComunicativas), 10);
        assert_eq!(a.question_count(Subject::CtaCcss), 15);

        let b = Area::B.definition();
        assert_eq!(b.question_count(Subject::Matematica), 30);
        assert_eq!(b.question_count(Subject::CtaCcss), 35);

        let c = Area::C.definition();
        assert_eq!(c.question_count(Subject::Comunicacion), 35);
        assert_eq!(c.question_count(Subject::CtaCcss), 25);
        assert_eq!(c.cta_label, "CCSS");
    }

    #[test]
    fn every_area_covers_all_slots_once() {
        for area in Area::ALL {
            let def = area.definition();
            let mut all: Vec<usize> = Subject::ALL.iter().flat_map(|s| def.slots(*s)).collect();
            all.sort_unstable();
            assert_eq!(all, (1..=MAX_QUESTIONS).collect::<Vec<_>>(), "area {area}");
        }
    }

    #[test]
    fn comunicacion_includes_tail_slots() {
        let slots = Area::A.definition().slots(Subject::Comunicacion);
        assert!(slots.contains(&21));
        assert!(slots.contains(&97));
        assert!(slots.contains(&100));
        assert!(!slots.contains(&22));
    }

    #[test]
    fn quiz_map_parse_skips_malformed() {
        let map = QuizAreaMap::parse("11907=A, 11908 = b ,abc=C,11910=D,,11911,12=C");
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(11907), Some(Area::A));
        assert_eq!(map.get(11908), Some(Area::B));
        assert_eq!(map.get(12), Some(Area::C));
        assert_eq!(map.get(11910), None);
        assert!(QuizAreaMap::parse("").is_empty());
    }

    #[test]
    fn quiz_map_display() {
        let map = QuizAreaMap::parse("2=B,1=A");
        assert_eq!(map.to_string(), "1=A,2=B");
    }

    #[test]
    fn guess_area() {
        assert_eq!(
            guess_area_from_name("Examen de Admisión – Ingenierías"),
            Some(Area::A)
        );
        assert_eq!(guess_area_from_name("CIENCIAS DE LA SALUD"), Some(Area::B));
        assert_eq!(guess_area_from_name("Ciencias Humanas"), Some(Area::C));
        assert_eq!(guess_area_from_name("Simulacro"), None);
    }

    #[test]
    fn mark_parsing_accepts_comma() {
        assert_eq!(Mark::Text("0,20".into()).as_f64(), Some(0.2));
        assert_eq!(Mark::Number(1.0).as_f64(), Some(1.0));
        assert_eq!(Mark::Text("-".into()).as_f64(), None);
    }

    #[test]
    fn course_ids() {
        assert_eq!(parse_course_ids("100, 101,").unwrap(), vec![100, 101]);
        assert!(parse_course_ids("100,x").is_err());
    }

    #[test]
    fn student_custom_fields() {
        let mut custom = HashMap::new();
        custom.insert(CF_DNI.to_string(), "12345678".to_string());
        custom.insert(CF_SEDE.to_string(), "SEDE ICA".to_string());
        let s = Student {
            id: 1,
            custom,
            ..Default::default()
        };
        assert_eq!(s.dni(), "12345678");
        assert_eq!(s.sede(), "SEDE ICA");
        assert_eq!(s.programa(), "");
    }
}
