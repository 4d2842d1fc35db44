//! Counters and counter formatters
//!
//!     A [`FormatNum`] turns a number into text: one of the named formatters (`arabic`,
//!     `alph`, `roman`, `fnsymbol`, ...), a `${name}` template composing them, a tag
//!     template such as `(a)` where the first of `a A i I 1` stands for the number, or
//!     any closure.
//!
//!     A [`CounterFormatter`] adds what is needed to show numbers in running text: a
//!     prefix (`Figure~`, `Eqs.~`), delimiters (`[` `]`) and the words used to join
//!     several numbers. [`CounterFormatter::format_many`] sorts and compresses a set of
//!     numbers into ranges and reports which pieces of the result belong to which number,
//!     so that each piece can be linked to its target.

use crate::error::{FlmError, Result};
use flm_config::{CounterFormatterConfig, FormatNumConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

static DOLLAR_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").unwrap());

static TAG_TEMPLATE_INITIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[aAiI1]").unwrap());

const ROMAN_TABLE: [(u64, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Largest value shown with letters, roman numerals or symbols; beyond it the
/// formatters fall back to arabic digits.
pub const MAX_SYMBOLIC_VALUE: u64 = 10_000;

const FNSYMBOLS: [&str; 6] = ["*", "†", "‡", "§", "¶", "‖"];

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const SUBSCRIPT_DIGITS: [char; 10] = ['₀', '₁', '₂', '₃', '₄', '₅', '₆', '₇', '₈', '₉'];

/// `a, b, …, z, aa, bb, …, zz, aaa, …`; empty for 0.
pub fn alph(n: u64) -> String {
    if n == 0 {
        return String::new();
    }
    if n > MAX_SYMBOLIC_VALUE {
        return n.to_string();
    }
    let n = n - 1;
    let letter = char::from(b'a' + (n % 26) as u8);
    std::iter::repeat(letter).take((1 + n / 26) as usize).collect()
}

pub fn alph_upper(n: u64) -> String {
    alph(n).to_uppercase()
}

/// Lowercase roman numerals; empty for 0.
pub fn roman(n: u64) -> String {
    roman_upper(n).to_lowercase()
}

pub fn roman_upper(mut n: u64) -> String {
    if n > MAX_SYMBOLIC_VALUE {
        return n.to_string();
    }
    let mut s = String::new();
    for (value, chars) in ROMAN_TABLE {
        for _ in 0..n / value {
            s.push_str(chars);
        }
        n %= value;
    }
    s
}

/// `*, †, ‡, §, ¶, ‖, **, ††, …`; empty for 0.
pub fn fnsymbol(n: u64) -> String {
    if n == 0 {
        return String::new();
    }
    if n > MAX_SYMBOLIC_VALUE {
        return n.to_string();
    }
    let n = n - 1;
    let len = FNSYMBOLS.len() as u64;
    FNSYMBOLS[(n % len) as usize].repeat((1 + n / len) as usize)
}

fn custom_digits(mut n: u64, digits: &[char; 10]) -> String {
    let mut s = Vec::new();
    while n > 0 {
        s.push(digits[(n % 10) as usize]);
        n /= 10;
    }
    s.iter().rev().collect()
}

pub fn unicode_superscript(n: u64) -> String {
    custom_digits(n, &SUPERSCRIPT_DIGITS)
}

pub fn unicode_subscript(n: u64) -> String {
    custom_digits(n, &SUBSCRIPT_DIGITS)
}

fn named_formatter(name: &str) -> Option<fn(u64) -> String> {
    let f: fn(u64) -> String = match name {
        "alph" => alph,
        "Alph" => alph_upper,
        "roman" => roman,
        "Roman" => roman_upper,
        "arabic" => |n| n.to_string(),
        "fnsymbol" => fnsymbol,
        "unicodesuperscript" => unicode_superscript,
        "unicodesubscript" => unicode_subscript,
        _ => return None,
    };
    Some(f)
}

fn tag_initial_formatter(initial: &str) -> fn(u64) -> String {
    match initial {
        "a" => alph,
        "A" => alph_upper,
        "i" => roman,
        "I" => roman_upper,
        _ => |n| n.to_string(),
    }
}

/// Number → text.
#[derive(Clone)]
pub struct FormatNum {
    description: String,
    f: Arc<dyn Fn(u64) -> String + Send + Sync>,
}

impl fmt::Debug for FormatNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatNum({})", self.description)
    }
}

impl FormatNum {
    pub fn custom(
        description: impl Into<String>,
        f: impl Fn(u64) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            f: Arc::new(f),
        }
    }

    pub fn named(name: &str) -> Result<Self> {
        let f = named_formatter(name).ok_or_else(|| {
            FlmError::configuration(format!("Invalid counter formatter: ‘{}’", name))
        })?;
        Ok(Self::custom(name, f))
    }

    /// `${arabic}.`, `(${roman})`, ...
    pub fn template(template: &str) -> Result<Self> {
        for caps in DOLLAR_TEMPLATE.captures_iter(template) {
            if named_formatter(&caps[1]).is_none() {
                return Err(FlmError::configuration(format!(
                    "Invalid counter formatter template ‘{}’: unknown formatter ‘{}’",
                    template, &caps[1]
                )));
            }
        }
        let owned = template.to_string();
        Ok(Self::custom(format!("template {}", template), move |n| {
            DOLLAR_TEMPLATE
                .replace_all(&owned, |caps: &regex::Captures<'_>| {
                    named_formatter(&caps[1]).map_or_else(String::new, |f| f(n))
                })
                .into_owned()
        }))
    }

    /// `(a)`, `i.`, `•`: the first of `a A i I 1` is replaced by the number, a tag
    /// without any of them is constant.
    pub fn tag_template(tag: &str) -> Self {
        match TAG_TEMPLATE_INITIAL.find(tag) {
            Some(m) => {
                let left = tag[..m.start()].to_string();
                let right = tag[m.end()..].to_string();
                let f = tag_initial_formatter(m.as_str());
                Self::custom(format!("tag {}", tag), move |n| {
                    format!("{}{}{}", left, f(n), right)
                })
            }
            None => {
                let constant = tag.to_string();
                Self::custom(format!("tag {}", tag), move |_| constant.clone())
            }
        }
    }

    /// A name, or (if `allow_tag_template`) a tag template; tables are `${...}` templates.
    pub fn from_config(config: &FormatNumConfig, allow_tag_template: bool) -> Result<Self> {
        match config {
            FormatNumConfig::Template { template } => Self::template(template),
            FormatNumConfig::Name(name) => match named_formatter(name) {
                Some(_) => Self::named(name),
                None if allow_tag_template => Ok(Self::tag_template(name)),
                None => Err(FlmError::configuration(format!(
                    "Invalid counter formatter: ‘{}’",
                    name
                ))),
            },
        }
    }

    pub fn format(&self, n: u64) -> String {
        (self.f)(n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrefixDisplay {
    pub singular: String,
    pub plural: String,
}

/// Words used when several numbers are shown together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub one_pre: String,
    pub one_post: String,
    pub pair_pre: String,
    pub pair_mid: String,
    pub pair_post: String,
    pub range_pre: String,
    pub range_mid: String,
    pub range_pairmid: String,
    pub range_post: String,
    pub list_pre: String,
    pub list_mid: String,
    pub list_midlast: String,
    pub list_post: String,
    pub empty: String,
}

impl Default for JoinSpec {
    fn default() -> Self {
        Self {
            one_pre: String::new(),
            one_post: String::new(),
            pair_pre: String::new(),
            pair_mid: " and ".to_string(),
            pair_post: String::new(),
            range_pre: String::new(),
            range_mid: "–".to_string(),
            range_pairmid: ",".to_string(),
            range_post: String::new(),
            list_pre: String::new(),
            list_mid: ", ".to_string(),
            list_midlast: ", and ".to_string(),
            list_post: String::new(),
            empty: "(empty)".to_string(),
        }
    }
}

impl JoinSpec {
    /// `1,2`, `1–3,5`
    pub fn compact() -> Self {
        Self {
            pair_mid: ",".to_string(),
            range_mid: "–".to_string(),
            range_pairmid: ",".to_string(),
            list_mid: ",".to_string(),
            list_midlast: ",".to_string(),
            ..Self::default()
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "default" => Ok(Self::default()),
            "compact" => Ok(Self::compact()),
            other => Err(FlmError::configuration(format!(
                "Invalid join spec ‘{}’; expected ‘default’ or ‘compact’",
                other
            ))),
        }
    }
}

/// What a piece of formatted text links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// Neutral: joins whichever link surrounds it.
    Any,
    /// Never part of a link.
    Never,
    Value(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedItem {
    pub text: String,
    pub target: LinkTarget,
}

impl FormattedItem {
    fn new(text: &str, target: LinkTarget) -> Self {
        Self {
            text: text.to_string(),
            target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterFormatter {
    pub format_num: FormatNum,
    pub prefix: PrefixDisplay,
    pub delimiters: (String, String),
    pub join_spec: JoinSpec,
    pub name_in_link: bool,
    pub id: Option<String>,
}

impl CounterFormatter {
    pub fn new(format_num: FormatNum) -> Self {
        Self {
            format_num,
            prefix: PrefixDisplay::default(),
            delimiters: (String::new(), String::new()),
            join_spec: JoinSpec::default(),
            name_in_link: true,
            id: None,
        }
    }

    pub fn with_prefix(mut self, singular: &str, plural: &str) -> Self {
        self.prefix = PrefixDisplay {
            singular: singular.to_string(),
            plural: plural.to_string(),
        };
        self
    }

    pub fn with_delimiters(mut self, open: &str, close: &str) -> Self {
        self.delimiters = (open.to_string(), close.to_string());
        self
    }

    pub fn with_join_spec(mut self, join_spec: JoinSpec) -> Self {
        self.join_spec = join_spec;
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Build from configuration; anything the configuration leaves out comes from
    /// `defaults`.
    pub fn from_config(
        config: &CounterFormatterConfig,
        defaults: CounterFormatter,
        id: &str,
    ) -> Result<Self> {
        let mut formatter = defaults.with_id(id);
        match config {
            CounterFormatterConfig::Simple(format_num) => {
                formatter.format_num = FormatNum::from_config(format_num, false)?;
            }
            CounterFormatterConfig::Full(spec) => {
                formatter.format_num = FormatNum::from_config(&spec.format_num, false)?;
                if let Some(prefix) = &spec.prefix_display {
                    formatter = formatter.with_prefix(&prefix.singular, &prefix.plural);
                }
                if let Some(delimiters) = &spec.delimiters {
                    match delimiters.as_slice() {
                        [open, close] => formatter = formatter.with_delimiters(open, close),
                        _ => {
                            return Err(FlmError::configuration(format!(
                                "Counter formatter ‘{}’: delimiters must be a pair",
                                id
                            )))
                        }
                    }
                }
                if let Some(join_spec) = &spec.join_spec {
                    formatter.join_spec = JoinSpec::by_name(join_spec)?;
                }
                if let Some(name_in_link) = spec.name_in_link {
                    formatter.name_in_link = name_in_link;
                }
            }
        }
        Ok(formatter)
    }

    fn prefix_for(&self, num_values: usize) -> &str {
        if num_values == 1 {
            &self.prefix.singular
        } else {
            &self.prefix.plural
        }
    }

    /// `prefix + open + number + close`, each part optional.
    pub fn format_flm(&self, value: u64, with_prefix: bool, with_delimiters: bool) -> String {
        let mut s = String::new();
        if with_prefix {
            s.push_str(self.prefix_for(1));
        }
        if with_delimiters {
            s.push_str(&self.delimiters.0);
        }
        s.push_str(&self.format_num.format(value));
        if with_delimiters {
            s.push_str(&self.delimiters.1);
        }
        s
    }

    /// Sort, deduplicate and compress `values` into ranges, returning the text in pieces
    /// tagged with the number they should link to.
    pub fn format_many(&self, values: &[u64], with_prefix: bool, with_delimiters: bool) -> Vec<FormattedItem> {
        let js = &self.join_spec;
        if values.is_empty() {
            return vec![FormattedItem::new(&js.empty, LinkTarget::Never)];
        }

        let mut values = values.to_vec();
        values.sort_unstable();
        values.dedup();
        let only_one_value = values.len() == 1;

        let mut ranges: Vec<(u64, u64)> = Vec::new();
        for v in &values {
            match ranges.last_mut() {
                Some(range) if *v == range.1 + 1 => range.1 = *v,
                _ => ranges.push((*v, *v)),
            }
        }
        if let [(a, b)] = ranges.as_slice() {
            if a + 1 == *b {
                ranges = vec![(*a, *a), (*b, *b)];
            }
        }

        let range_items = |(a, b): (u64, u64)| -> Vec<FormattedItem> {
            if a == b {
                return vec![FormattedItem {
                    text: self.format_num.format(a),
                    target: LinkTarget::Value(a),
                }];
            }
            let mid = if b == a + 1 { &js.range_pairmid } else { &js.range_mid };
            vec![
                FormattedItem::new(&js.range_pre, LinkTarget::Never),
                FormattedItem {
                    text: self.format_num.format(a),
                    target: LinkTarget::Value(a),
                },
                FormattedItem::new(mid, LinkTarget::Never),
                FormattedItem {
                    text: self.format_num.format(b),
                    target: LinkTarget::Value(b),
                },
                FormattedItem::new(&js.range_post, LinkTarget::Never),
            ]
        };

        let mut items = Vec::new();
        match ranges.as_slice() {
            [only] => {
                items.push(FormattedItem::new(&js.one_pre, LinkTarget::Any));
                items.extend(range_items(*only));
                items.push(FormattedItem::new(&js.one_post, LinkTarget::Any));
            }
            [first, second] => {
                items.push(FormattedItem::new(&js.pair_pre, LinkTarget::Never));
                items.extend(range_items(*first));
                items.push(FormattedItem::new(&js.pair_mid, LinkTarget::Never));
                items.extend(range_items(*second));
                items.push(FormattedItem::new(&js.pair_post, LinkTarget::Never));
            }
            [init @ .., last] => {
                items.push(FormattedItem::new(&js.list_pre, LinkTarget::Never));
                for (j, range) in init.iter().enumerate() {
                    if j > 0 {
                        items.push(FormattedItem::new(&js.list_mid, LinkTarget::Never));
                    }
                    items.extend(range_items(*range));
                }
                items.push(FormattedItem::new(&js.list_midlast, LinkTarget::Never));
                items.extend(range_items(*last));
                items.push(FormattedItem::new(&js.list_post, LinkTarget::Never));
            }
            [] => {}
        }

        let first_n = if !self.name_in_link {
            LinkTarget::Never
        } else {
            items
                .iter()
                .map(|item| item.target)
                .find(|target| matches!(target, LinkTarget::Value(_)))
                .unwrap_or(LinkTarget::Any)
        };

        let mut all = Vec::new();
        if with_prefix {
            let prefix = self.prefix_for(values.len());
            if !prefix.is_empty() {
                all.push(FormattedItem::new(prefix, first_n));
            }
        }
        let (open, close) = if with_delimiters {
            (self.delimiters.0.as_str(), self.delimiters.1.as_str())
        } else {
            ("", "")
        };
        all.push(FormattedItem::new(
            open,
            if self.name_in_link && only_one_value {
                LinkTarget::Any
            } else {
                LinkTarget::Never
            },
        ));
        all.extend(items);
        all.push(FormattedItem::new(
            close,
            if only_one_value {
                LinkTarget::Any
            } else {
                LinkTarget::Never
            },
        ));

        merge_by_target(all.into_iter().filter(|item| !item.text.is_empty()).collect())
    }

    /// [`format_many`](Self::format_many) with each linked piece passed through `link`.
    pub fn format_many_linked(
        &self,
        values: &[u64],
        with_prefix: bool,
        with_delimiters: bool,
        mut link: impl FnMut(u64, &str) -> Result<String>,
    ) -> Result<String> {
        let mut s = String::new();
        for item in self.format_many(values, with_prefix, with_delimiters) {
            match item.target {
                LinkTarget::Value(n) => s.push_str(&link(n, &item.text)?),
                LinkTarget::Any | LinkTarget::Never => s.push_str(&item.text),
            }
        }
        Ok(s)
    }
}

/// Merge consecutive pieces that can share a link.
fn merge_by_target(items: Vec<FormattedItem>) -> Vec<FormattedItem> {
    let mut merged: Vec<FormattedItem> = Vec::new();
    let mut current: Option<FormattedItem> = None;
    for item in items {
        if let Some(cur) = current.as_mut() {
            if item.target == LinkTarget::Never && cur.target == LinkTarget::Never {
                cur.text.push_str(&item.text);
                continue;
            }
            if cur.target != LinkTarget::Never
                && (item.target == LinkTarget::Any
                    || cur.target == LinkTarget::Any
                    || item.target == cur.target)
            {
                if item.target != LinkTarget::Any && cur.target == LinkTarget::Any {
                    cur.target = item.target;
                }
                cur.text.push_str(&item.text);
                continue;
            }
        }
        if let Some(done) = current.take() {
            merged.push(done);
        }
        current = Some(item);
    }
    merged.extend(current);
    merged
}

/// A running number with its formatter.
#[derive(Debug, Clone)]
pub struct Counter {
    pub formatter: CounterFormatter,
    pub value: u64,
    initial_value: u64,
}

impl Counter {
    pub fn new(formatter: CounterFormatter) -> Self {
        Self {
            formatter,
            value: 0,
            initial_value: 0,
        }
    }

    pub fn set_value(&mut self, value: u64) -> u64 {
        self.value = value;
        value
    }

    pub fn step(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    pub fn reset(&mut self) -> u64 {
        self.value = self.initial_value;
        self.value
    }

    /// The number without prefix, with delimiters.
    pub fn format_flm(&self, value: u64) -> String {
        self.formatter.format_flm(value, false, true)
    }

    pub fn step_and_format(&mut self) -> (u64, String) {
        let value = self.step();
        (value, self.format_flm(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, "a")]
    #[case(26, "z")]
    #[case(27, "aa")]
    #[case(28, "bb")]
    #[case(53, "aaa")]
    fn test_alph(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(alph(n), expected);
        assert_eq!(alph_upper(n), expected.to_uppercase());
    }

    #[rstest]
    #[case(0, "")]
    #[case(1, "i")]
    #[case(4, "iv")]
    #[case(9, "ix")]
    #[case(49, "xlix")]
    #[case(2099, "mmxcix")]
    fn test_roman(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(roman(n), expected);
        assert_eq!(roman_upper(n), expected.to_uppercase());
    }

    #[test]
    fn test_huge_values_fall_back_to_arabic() {
        assert_eq!(roman(MAX_SYMBOLIC_VALUE), "m".repeat(10));
        assert_eq!(alph(MAX_SYMBOLIC_VALUE).len(), 385);
        let formatters: [fn(u64) -> String; 5] = [alph, alph_upper, roman, roman_upper, fnsymbol];
        for f in formatters {
            assert_eq!(f(MAX_SYMBOLIC_VALUE + 1), "10001");
            assert_eq!(f(u64::MAX), u64::MAX.to_string());
        }
    }

    #[test]
    fn test_symbol_and_digit_formatters() {
        assert_eq!(fnsymbol(1), "*");
        assert_eq!(fnsymbol(6), "‖");
        assert_eq!(fnsymbol(8), "††");
        assert_eq!(unicode_superscript(120), "¹²⁰");
        assert_eq!(unicode_subscript(34), "₃₄");
    }

    #[test]
    fn test_templates() {
        let f = FormatNum::template("(${roman}) ${arabic}").unwrap();
        assert_eq!(f.format(4), "(iv) 4");
        assert!(FormatNum::template("${nope}").is_err());

        assert_eq!(FormatNum::tag_template("(a)").format(3), "(c)");
        assert_eq!(FormatNum::tag_template("I.").format(3), "III.");
        assert_eq!(FormatNum::tag_template("•").format(3), "•");
    }

    #[test]
    fn test_from_config_honors_tag_template_switch() {
        let bullet = FormatNumConfig::Name("•".to_string());
        assert!(FormatNum::from_config(&bullet, false).is_err());
        assert_eq!(FormatNum::from_config(&bullet, true).unwrap().format(7), "•");
        let named = FormatNumConfig::Name("Alph".to_string());
        assert_eq!(FormatNum::from_config(&named, false).unwrap().format(2), "B");
    }

    fn render(items: &[FormattedItem]) -> String {
        items
            .iter()
            .map(|item| match item.target {
                LinkTarget::Value(n) => format!("<{}:{}>", n, item.text),
                _ => item.text.clone(),
            })
            .collect()
    }

    fn citation_formatter() -> CounterFormatter {
        CounterFormatter::new(FormatNum::named("arabic").unwrap())
            .with_delimiters("[", "]")
            .with_join_spec(JoinSpec::compact())
    }

    #[test]
    fn test_format_many_compresses_ranges() {
        let f = citation_formatter();
        let items = f.format_many(&[3, 2, 5, 1, 6], true, true);
        let plain: String = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(plain, "[1–3,5,6]");
        assert_eq!(render(&items), "[<1:1>–<3:3>,<5:5>,<6:6>]");
    }

    #[test]
    fn test_format_many_single_value_links_delimiters() {
        let f = citation_formatter();
        assert_eq!(render(&f.format_many(&[4], true, true)), "<4:[4]>");
    }

    #[test]
    fn test_format_many_lone_pair_is_split() {
        let f = CounterFormatter::new(FormatNum::named("arabic").unwrap())
            .with_prefix("Eq.~", "Eqs.~");
        assert_eq!(render(&f.format_many(&[2, 1], true, true)), "<1:Eqs.~1> and <2:2>");
        assert_eq!(
            render(&f.format_many(&[1, 2, 3, 7], true, true)),
            "<1:Eqs.~1>–<3:3> and <7:7>"
        );
        assert_eq!(
            render(&f.format_many(&[1, 3, 5], false, true)),
            "<1:1>, <3:3>, and <5:5>"
        );
    }

    #[test]
    fn test_format_many_ignores_duplicates() {
        let f = citation_formatter();
        assert_eq!(render(&f.format_many(&[2, 2], true, true)), "<2:[2]>");
        let plain: String = f
            .format_many(&[5, 1, 2, 1, 3, 5], true, true)
            .iter()
            .map(|item| item.text.as_str())
            .collect();
        assert_eq!(plain, "[1–3,5]");

        let eq = CounterFormatter::new(FormatNum::named("arabic").unwrap()).with_prefix("Eq.~", "Eqs.~");
        assert_eq!(render(&eq.format_many(&[3, 3], true, true)), "<3:Eq.~3>");
    }

    #[test]
    fn test_format_many_empty() {
        let f = citation_formatter();
        assert_eq!(render(&f.format_many(&[], true, true)), "(empty)");
    }

    #[test]
    fn test_format_flm_and_counter() {
        let f = CounterFormatter::new(FormatNum::named("roman").unwrap())
            .with_prefix("Figure~", "Figures~")
            .with_delimiters("(", ")");
        assert_eq!(f.format_flm(3, true, true), "Figure~(iii)");
        assert_eq!(f.format_flm(3, false, false), "iii");

        let mut counter = Counter::new(f);
        assert_eq!(counter.step_and_format(), (1, "(i)".to_string()));
        assert_eq!(counter.step(), 2);
        assert_eq!(counter.set_value(10), 10);
        assert_eq!(counter.reset(), 0);
    }

    #[test]
    fn test_formatter_from_config() {
        let config = flm_config::load_defaults().unwrap();
        let f = CounterFormatter::from_config(
            &config.math.counter_formatter,
            CounterFormatter::new(FormatNum::named("arabic").unwrap()),
            "eq",
        )
        .unwrap();
        assert_eq!(f.id.as_deref(), Some("eq"));
        assert_eq!(f.format_flm(2, true, true), "Eq.~(2)");
        assert_eq!(f.join_spec, JoinSpec::compact());
    }

    proptest! {
        #[test]
        fn arabic_is_decimal(n in 0u64..10_000_000) {
            prop_assert_eq!(FormatNum::named("arabic").unwrap().format(n), n.to_string());
        }

        #[test]
        fn formatters_are_total(n in 1u64..5000) {
            for name in ["alph", "Alph", "roman", "Roman", "fnsymbol", "unicodesuperscript", "unicodesubscript"] {
                prop_assert!(!FormatNum::named(name).unwrap().format(n).is_empty());
            }
        }

        #[test]
        fn format_many_mentions_every_value(values in prop::collection::btree_set(1u64..60, 1..12)) {
            let values: Vec<u64> = values.into_iter().collect();
            let items = citation_formatter().format_many(&values, true, true);
            let linked: Vec<u64> = items
                .iter()
                .filter_map(|item| match item.target {
                    LinkTarget::Value(n) => Some(n),
                    _ => None,
                })
                .collect();
            prop_assert!(linked.iter().all(|n| values.contains(n)));
            prop_assert_eq!(linked.first(), values.first());
            prop_assert_eq!(linked.last(), values.last());
        }
    }
}
