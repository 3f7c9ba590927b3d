//! Canonical forms for reaction formulas and rate constants.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static CE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\ce\{(.+?)\}").expect("ce regex compiles"));
static ARROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\rightarrow|\\to|->").expect("arrow regex compiles"));
static SUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\^\{([^}]+)\}|\^([A-Za-z0-9+\-]+)").expect("superscript regex compiles")
});
static SUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_\{([^}]+)\}|_([A-Za-z0-9+\-]+)").expect("subscript regex compiles")
});
static SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex compiles"));

/// A reaction formula reduced to a comparable plain-text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFormula {
    pub canonical: String,
    pub reactants: String,
    pub products: String,
    pub reactant_species: Vec<String>,
    pub product_species: Vec<String>,
}

/// Reduce a LaTeX reaction formula to its canonical form.
///
/// Two formulas that differ only in math delimiters, `\ce{}` wrapping, arrow
/// spelling, radical notation, brace style or whitespace canonicalize equally.
pub fn canonicalize(formula_latex: &str) -> CanonicalFormula {
    let mut core = strip_math(formula_latex).to_string();
    if let Some(inner) = CE_RE.captures(&core).and_then(|c| c.get(1)) {
        core = inner.as_str().to_string();
    }
    core = ARROW_RE.replace_all(&core, "->").into_owned();
    core = core
        .replace("^{.-}", "•-")
        .replace("^{.+}", "•+")
        .replace("\\cdot", "•")
        .replace("\\bullet", "•");
    core = SUP_RE.replace_all(&core, |c: &Captures<'_>| format!("^{}", either(c))).into_owned();
    core = SUB_RE.replace_all(&core, |c: &Captures<'_>| format!("_{}", either(c))).into_owned();
    core = SPACES_RE.replace_all(&core, " ").trim().to_string();

    let (reactants, products) = match core.split_once("->") {
        Some((lhs, rhs)) => (lhs.trim().to_string(), rhs.trim().to_string()),
        None => (core.trim().to_string(), String::new()),
    };
    let canonical = if products.is_empty() {
        reactants.clone()
    } else {
        format!("{reactants} -> {products}")
    };

    CanonicalFormula {
        reactant_species: species(&reactants),
        product_species: species(&products),
        canonical,
        reactants,
        products,
    }
}

/// Parse a rate constant such as `5.5 x10^9`, `1.2 \times 10^{10}` or `3e9`.
pub fn parse_rate_value(raw: &str) -> Option<f64> {
    let compact: String = raw
        .trim()
        .replace("\\times", "x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let compact = compact.replace(['{', '}'], "");
    for marker in ["x10^", "×10^"] {
        if let Some((base, exp)) = compact.split_once(marker) {
            let base: f64 = base.parse().ok()?;
            let exp: i32 = exp.parse().ok()?;
            return Some(base * 10f64.powi(exp));
        }
    }
    compact.parse().ok()
}

fn strip_math(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('$') && s.ends_with('$') {
        return &s[1..s.len() - 1];
    }
    for (open, close) in [("\\(", "\\)"), ("\\[", "\\]")] {
        if s.len() >= 4 && s.starts_with(open) && s.ends_with(close) {
            return &s[2..s.len() - 2];
        }
    }
    s
}

fn either<'a>(c: &'a Captures<'_>) -> &'a str {
    c.get(1).or_else(|| c.get(2)).map_or("", |m| m.as_str())
}

fn species(side: &str) -> Vec<String> {
    if side.is_empty() {
        return Vec::new();
    }
    side.split('+')
        .map(|t| SPACES_RE.replace_all(t.trim(), " ").into_owned())
        .collect()
}
