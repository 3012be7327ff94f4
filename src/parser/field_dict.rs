//! Canonical Buchungsstapel fields and their label synonyms.

/// How a field's raw value is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Amount with comma decimal separator.
    Decimal,
    /// Digit string with significant leading zeros (accounts, keys).
    Identifier,
    /// Day and month without year.
    Ttmm,
    /// `TTMMJJJJ`.
    FullDate,
    /// One of a fixed set of codes.
    Enum(&'static [&'static str]),
    Text,
}

/// One entry of the field dictionary.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub id: &'static str,
    pub label: &'static str,
    pub synonyms: &'static [&'static str],
    pub kind: FieldKind,
    /// The column must be present in record 2.
    pub required: bool,
}

macro_rules! field {
    ($id:literal, $label:literal, [$($syn:literal),*], $kind:expr, $req:literal) => {
        FieldDef {
            id: $id,
            label: $label,
            synonyms: &[$($syn),*],
            kind: $kind,
            required: $req,
        }
    };
}

/// Known fields in EXTF column order.
pub static FIELDS: &[FieldDef] = &[
    field!("umsatz", "Umsatz (ohne Soll/Haben-Kz)", ["Umsatz", "Betrag", "Amount"], FieldKind::Decimal, true),
    field!("soll_haben", "Soll/Haben-Kennzeichen", ["Soll-/Haben-Kennzeichen", "Soll/Haben", "S/H"], FieldKind::Enum(&["S", "H"]), true),
    field!("wkz", "WKZ Umsatz", ["WKZ", "Währung"], FieldKind::Text, false),
    field!("kurs", "Kurs", ["Wechselkurs"], FieldKind::Decimal, false),
    field!("basisumsatz", "Basisumsatz", ["Basis-Umsatz"], FieldKind::Decimal, false),
    field!("wkz_basisumsatz", "WKZ Basisumsatz", ["WKZ Basis-Umsatz"], FieldKind::Text, false),
    field!("konto", "Konto", ["Kontonummer"], FieldKind::Identifier, true),
    field!("gegenkonto", "Gegenkonto (ohne BU-Schlüssel)", ["Gegenkonto"], FieldKind::Identifier, true),
    field!("bu_schluessel", "BU-Schlüssel", ["BU", "Buchungsschlüssel"], FieldKind::Identifier, false),
    field!("belegdatum", "Belegdatum", ["Datum"], FieldKind::Ttmm, true),
    field!("belegfeld1", "Belegfeld 1", ["Belegfeld1", "Rechnungsnummer"], FieldKind::Text, false),
    field!("belegfeld2", "Belegfeld 2", ["Belegfeld2"], FieldKind::Text, false),
    field!("skonto", "Skonto", [], FieldKind::Decimal, false),
    field!("buchungstext", "Buchungstext", ["Text"], FieldKind::Text, false),
    field!("eu_ustid", "EU-Land u. UStID (Bestimmung)", ["EU-Land u. UStID", "EU-UStID"], FieldKind::Text, false),
    field!("leistungsdatum", "Leistungsdatum", [], FieldKind::FullDate, false),
    field!("faelligkeit", "Fälligkeit", ["Faelligkeit"], FieldKind::FullDate, false),
    field!("generalumkehr", "Generalumkehr (GU)", ["Generalumkehr"], FieldKind::Enum(&["0", "1"]), false),
];

/// Lowercase with all whitespace removed.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a column label to its field definition.
pub fn lookup(label: &str) -> Option<&'static FieldDef> {
    let key = normalize_label(label);
    if key.is_empty() {
        return None;
    }
    FIELDS.iter().find(|def| {
        normalize_label(def.label) == key
            || normalize_label(def.id) == key
            || def.synonyms.iter().any(|s| normalize_label(s) == key)
    })
}

/// Field definition by canonical id.
pub fn field(id: &str) -> Option<&'static FieldDef> {
    FIELDS.iter().find(|def| def.id == id)
}

/// Canonical ids of the columns every file must carry.
pub fn required_fields() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().filter(|d| d.required).map(|d| d.id)
}

/// Id for a label missing from the dictionary.
pub fn generated_id(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
