//! Rule-based extractor
//!
//! Needs no external service. Amounts are found with a pattern table
//! (`20k`, `2 lakhs`, `₹1,20,000`, `5000 rupees`), categories with keyword
//! tables, and each amount goes to the nearest unfilled category mentioned in
//! the same sentence. "each"/"both" spreads one amount over every mentioned
//! merchant. A message with amounts but no category answers the previous
//! assistant question.

use super::SpendingExtractor;
use crate::conversation::{user_messages, ConversationTurn, Role};
use crate::models::Extraction;
use crate::readiness::detect_intents;
use crate::spending::{Cadence, SpendingCategory, SpendingRecord, ValidationReport};
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

/// Bare numbers below this are read as visit counts, not rupees
const COUNT_CEILING: f64 = 100.0;

/// How far past an amount to look for "per month", "each", ...
const QUALIFIER_WINDOW: usize = 40;

lazy_static! {
    static ref AMOUNT_RE: Regex = Regex::new(
        r"(?P<cur>₹|\brs\.?|\binr)?\s*(?P<num>\d{1,3}(?:,\d{2,3})+|\d+(?:\.\d+)?)\s*(?P<unit>crores?|cr|lakhs?|lacs?|lac|l|thousand|k)?\b(?P<rupees>\s*(?:rupees|rs|inr)\b)?"
    )
    .expect("amount pattern");

    static ref MONTHLY_RE: Regex = Regex::new(
        r"\b(?:monthly|per month|a month|every month|each month|pm)\b|/\s*(?:month|mo)\b"
    )
    .expect("monthly pattern");

    static ref ANNUAL_RE: Regex = Regex::new(
        r"\b(?:annually|annual|yearly|per year|a year|every year|each year|per annum|pa)\b|/\s*(?:year|yr|annum)\b"
    )
    .expect("annual pattern");

    static ref QUARTERLY_RE: Regex = Regex::new(
        r"\b(?:quarterly|per quarter|a quarter|every quarter|each quarter)\b|/\s*(?:quarter|qtr)\b"
    )
    .expect("quarterly pattern");

    static ref EACH_RE: Regex = Regex::new(
        r"\b(?:each|both)\b(?P<period>\s+(?:month|year|quarter))?"
    )
    .expect("distribution pattern");

    /// Earlier entries win when phrases overlap ("international lounge"
    /// before "lounge").
    static ref CATEGORY_PATTERNS: Vec<(SpendingCategory, Regex)> = {
        use SpendingCategory::*;
        [
            (InternationalLoungeUsageQuarterly, r"\binternational lounges?\b"),
            (RailwayLoungeUsageQuarterly, r"\b(?:railway|train) lounges?\b"),
            (DomesticLoungeUsageQuarterly, r"\b(?:domestic |airport )?lounges?\b"),
            (InsuranceHealthAnnual, r"\b(?:health|medical) insurance\b"),
            (InsuranceCarOrBikeAnnual, r"\b(?:car|bike|motor|vehicle) insurance\b"),
            (MobilePhoneBills, r"\b(?:mobile|phone)(?: bills?| recharges?)\b|\b(?:recharges?|postpaid)\b"),
            (WaterBills, r"\bwater bills?\b"),
            (ElectricityBills, r"\belectricity\b"),
            (AmazonSpends, r"\bamazon\b"),
            (FlipkartSpends, r"\bflipkart\b"),
            (GrocerySpendsOnline, r"\b(?:grocer(?:y|ies)|bigbasket|blinkit|zepto|instamart)\b"),
            (OnlineFoodOrdering, r"\b(?:swiggy|zomato|food deliver(?:y|ies)|food order(?:ing|s)?|order(?:ing)? food)\b"),
            (DiningOrGoingOut, r"\b(?:dining|dine|restaurants?|eating out|going out)\b"),
            (Fuel, r"\b(?:fuel|petrol|diesel)\b"),
            (SchoolFees, r"\b(?:school|tuition|education)\b"),
            (Rent, r"\brent(?:al)?\b"),
            (OttChannels, r"\b(?:ott|netflix|hotstar|prime video|spotify|streaming)\b"),
            (HotelsAnnual, r"\bhotels?\b"),
            (FlightsAnnual, r"\b(?:flights?|fly|flying|airlines?|air tickets?|travel(?:s|ling|ing)?)\b"),
            (LargeElectronicsPurchase, r"\b(?:electronics|gadgets?|laptops?|tv|television)\b"),
            (AllPharmacy, r"\b(?:pharmacy|medicines?|healthcare)\b"),
            (MovieUsage, r"\b(?:movies?|cinema)\b"),
            (OtherOnlineSpends, r"\b(?:online shopping|shop(?:ping)? online|clothes|apparel|fashion|myntra|ajio|nykaa)\b"),
            (OtherOfflineSpends, r"\b(?:offline shopping|shop(?:ping)? offline|malls?)\b"),
        ]
        .into_iter()
        .map(|(category, pattern)| (category, Regex::new(pattern).expect("category pattern")))
        .collect()
    };
}

#[derive(Debug, Clone, Copy)]
struct AmountMatch {
    value: f64,
    start: usize,
    end: usize,
    is_count: bool,
}

#[derive(Debug, Clone, Copy)]
struct Mention {
    category: SpendingCategory,
    start: usize,
    end: usize,
}

/// Rule-based extractor for offline use and as a fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Pure extraction over the message and the conversation so far
    pub fn extract_sync(&self, message: &str, history: &[ConversationTurn]) -> Extraction {
        let lowered = message.to_lowercase();
        let amounts = find_amounts(&lowered);
        let breaks = sentence_breaks(&lowered);

        let mut mentions = find_mentions(&lowered);
        let from_context = mentions.is_empty() && !amounts.is_empty();
        if from_context {
            mentions = last_assistant_mentions(history);
        }

        let mut filled = vec![false; mentions.len()];
        let mut delta = SpendingRecord::new();

        for (i, amount) in amounts.iter().enumerate() {
            let bound = amounts
                .get(i + 1)
                .map(|next| next.start)
                .unwrap_or(lowered.len())
                .min(amount.end + QUALIFIER_WINDOW)
                .min(sentence_end(&breaks, amount.start, lowered.len()));
            let window = slice_to_boundary(&lowered, amount.end, bound);
            let stated = stated_cadence(window);

            let eligible: Vec<usize> = (0..mentions.len())
                .filter(|&m| !filled[m])
                .filter(|&m| mentions[m].category.is_usage_count() == amount.is_count)
                .filter(|&m| {
                    from_context
                        || sentence_index(&breaks, mentions[m].start)
                            == sentence_index(&breaks, amount.start)
                })
                .collect();

            let targets: Vec<usize> = if distributes(window) {
                eligible
            } else if from_context {
                eligible.into_iter().take(1).collect()
            } else {
                eligible
                    .into_iter()
                    .min_by_key(|&m| distance(amount, &mentions[m]))
                    .into_iter()
                    .collect()
            };

            for target in targets {
                let category = mentions[target].category;
                let value = stated
                    .map(|c| c.convert(amount.value, category.cadence()))
                    .unwrap_or(amount.value)
                    .round();
                delta.set(category, value);

                for (m, mention) in mentions.iter().enumerate() {
                    if mention.category == category {
                        filled[m] = true;
                    }
                }
            }
        }

        let mut pending: Vec<SpendingCategory> = Vec::new();
        for mention in &mentions {
            if !delta.is_set(mention.category) && !pending.contains(&mention.category) {
                pending.push(mention.category);
            }
        }

        let has_intent = !detect_intents(message).is_empty()
            || user_messages(history).any(|text| !detect_intents(text).is_empty());

        Extraction {
            reply: compose_reply(&delta, &pending),
            follow_up: compose_follow_up(&delta, &pending, has_intent),
            delta,
            validation: ValidationReport::default(),
        }
    }
}

#[async_trait]
impl SpendingExtractor for HeuristicExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn extract(
        &self,
        message: &str,
        history: &[ConversationTurn],
        _accumulated: &SpendingRecord,
    ) -> Result<Extraction> {
        Ok(self.extract_sync(message, history))
    }
}

//
// ================= Matching =================
//

fn find_amounts(text: &str) -> Vec<AmountMatch> {
    AMOUNT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let num = caps.name("num")?;
            let whole = caps.get(0)?;

            let rest = text[whole.end()..].trim_start();
            if rest.starts_with('%') || rest.starts_with('x') {
                return None;
            }

            let base: f64 = num.as_str().replace(',', "").parse().ok()?;
            let unit = caps.name("unit").map(|u| u.as_str());
            let multiplier = match unit {
                Some(u) if u.starts_with("cr") => 10_000_000.0,
                Some(u) if u.starts_with('l') => 100_000.0,
                Some(_) => 1_000.0,
                None => 1.0,
            };
            let has_currency = caps.name("cur").is_some() || caps.name("rupees").is_some();

            Some(AmountMatch {
                value: base * multiplier,
                start: num.start(),
                end: whole.end(),
                is_count: unit.is_none() && !has_currency && base < COUNT_CEILING,
            })
        })
        .collect()
}

fn find_mentions(text: &str) -> Vec<Mention> {
    let mut mentions: Vec<Mention> = Vec::new();

    for (category, pattern) in CATEGORY_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let overlaps = mentions
                .iter()
                .any(|other| m.start() < other.end && other.start < m.end());
            if !overlaps {
                mentions.push(Mention {
                    category: *category,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
    }

    mentions.sort_by_key(|m| m.start);
    mentions
}

/// Categories the assistant last asked about, in the order it named them
fn last_assistant_mentions(history: &[ConversationTurn]) -> Vec<Mention> {
    let Some(turn) = history.iter().rev().find(|t| t.role == Role::Assistant) else {
        return Vec::new();
    };

    let question = turn
        .follow_up_question
        .as_deref()
        .unwrap_or(turn.content.as_str())
        .to_lowercase();
    find_mentions(&question)
}

fn stated_cadence(window: &str) -> Option<Cadence> {
    [
        (Cadence::Monthly, &*MONTHLY_RE),
        (Cadence::Annual, &*ANNUAL_RE),
        (Cadence::Quarterly, &*QUARTERLY_RE),
    ]
    .into_iter()
    .filter_map(|(cadence, re)| re.find(window).map(|m| (m.start(), cadence)))
    .min_by_key(|(start, _)| *start)
    .map(|(_, cadence)| cadence)
}

/// "15k on each" spreads; "15k each month" does not
fn distributes(window: &str) -> bool {
    EACH_RE
        .captures_iter(window)
        .any(|caps| caps.name("period").is_none())
}

fn distance(amount: &AmountMatch, mention: &Mention) -> usize {
    if mention.end <= amount.start {
        amount.start - mention.end
    } else if mention.start >= amount.end {
        mention.start - amount.end
    } else {
        0
    }
}

/// Byte offsets of sentence terminators. A period only ends a sentence when
/// followed by whitespace and not part of "rs.".
fn sentence_breaks(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut breaks = Vec::new();

    for (i, ch) in text.char_indices() {
        let is_break = match ch {
            '!' | '?' | ';' | '\n' => true,
            '.' => {
                let next_is_space = bytes.get(i + 1).map_or(true, |b| b.is_ascii_whitespace());
                let after_rs = text.get(i.saturating_sub(2)..i) == Some("rs");
                next_is_space && !after_rs
            }
            _ => false,
        };
        if is_break {
            breaks.push(i);
        }
    }

    breaks
}

fn sentence_index(breaks: &[usize], pos: usize) -> usize {
    breaks.partition_point(|&b| b < pos)
}

fn sentence_end(breaks: &[usize], pos: usize, len: usize) -> usize {
    breaks.get(sentence_index(breaks, pos)).copied().unwrap_or(len)
}

fn slice_to_boundary(text: &str, start: usize, end: usize) -> &str {
    let mut end = end.min(text.len());
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(start..end).unwrap_or("")
}

//
// ================= Replies =================
//

fn period_suffix(cadence: Cadence) -> &'static str {
    match cadence {
        Cadence::Monthly => "/month",
        Cadence::Quarterly => "/quarter",
        Cadence::Annual => "/year",
    }
}

fn period_phrase(cadence: Cadence) -> &'static str {
    match cadence {
        Cadence::Monthly => "each month",
        Cadence::Quarterly => "each quarter",
        Cadence::Annual => "in a year",
    }
}

/// Indian digit grouping: 120000 → "1,20,000"
pub fn format_inr(amount: f64) -> String {
    let digits = (amount.round() as u64).to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (h, t) = rest.split_at(rest.len() - 2);
        groups.push(t);
        rest = h;
    }
    groups.push(rest);
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}

fn join_names(categories: &[SpendingCategory]) -> String {
    let names: Vec<String> = categories
        .iter()
        .map(|c| c.display_name().to_string())
        .collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn compose_reply(delta: &SpendingRecord, pending: &[SpendingCategory]) -> String {
    if !delta.is_empty() {
        let parts: Vec<String> = delta
            .iter()
            .map(|(category, amount)| {
                if category.is_usage_count() {
                    format!(
                        "{} {}{}",
                        category.display_name(),
                        format_inr(amount),
                        period_suffix(category.cadence())
                    )
                } else {
                    format!(
                        "{} ₹{}{}",
                        category.display_name(),
                        format_inr(amount),
                        period_suffix(category.cadence())
                    )
                }
            })
            .collect();
        return format!("Got it: {}.", parts.join(", "));
    }

    if !pending.is_empty() {
        return format!("Thanks! I'll factor in {}.", join_names(pending));
    }

    "Tell me a bit about where your money goes and I'll find cards that pay you back."
        .to_string()
}

fn compose_follow_up(
    delta: &SpendingRecord,
    pending: &[SpendingCategory],
    has_intent: bool,
) -> Option<String> {
    if let Some(first) = pending.first() {
        let names = join_names(pending).to_lowercase();
        let question = if first.is_usage_count() {
            format!(
                "Roughly how many {} do you use {}?",
                names,
                period_phrase(first.cadence())
            )
        } else {
            format!(
                "How much do you usually spend on {} {}?",
                names,
                period_phrase(first.cadence())
            )
        };
        return Some(question);
    }

    if delta.is_empty() {
        return Some(
            "How much do you spend each month on things like rent, groceries, fuel or online shopping?"
                .to_string(),
        );
    }

    if !has_intent {
        return Some(
            "What matters most to you in a card: travel, rewards, cashback, fuel or dining benefits?"
                .to_string(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(message: &str) -> Extraction {
        HeuristicExtractor::new().extract_sync(message, &[])
    }

    #[test]
    fn test_rent_with_merchant_offers() {
        let extraction = extract("I pay 20k rent and want offers on Amazon and Flipkart");

        assert_eq!(extraction.delta.get(SpendingCategory::Rent), Some(20000.0));
        assert_eq!(extraction.delta.len(), 1);
        let follow_up = extraction.follow_up.unwrap();
        assert!(follow_up.contains("amazon and flipkart"), "{}", follow_up);
        assert!(follow_up.contains("each month"));
    }

    #[test]
    fn test_each_spreads_amount() {
        let extraction = extract("I shop a lot on Amazon and Flipkart, around 15k per month on each");

        assert_eq!(extraction.delta.get(SpendingCategory::AmazonSpends), Some(15000.0));
        assert_eq!(extraction.delta.get(SpendingCategory::FlipkartSpends), Some(15000.0));
    }

    #[test]
    fn test_each_month_does_not_spread() {
        let extraction = extract("I spend 10k on fuel each month and like dining out");

        assert_eq!(extraction.delta.get(SpendingCategory::Fuel), Some(10000.0));
        assert!(!extraction.delta.is_set(SpendingCategory::DiningOrGoingOut));
    }

    #[test]
    fn test_units_and_currency_markers() {
        assert_eq!(
            extract("I spend about 5000 rupees on Amazon every month")
                .delta
                .get(SpendingCategory::AmazonSpends),
            Some(5000.0)
        );
        assert_eq!(
            extract("rent is ₹1,20,000 a year").delta.get(SpendingCategory::Rent),
            Some(10000.0)
        );
        assert_eq!(
            extract("Rs. 2500 on petrol").delta.get(SpendingCategory::Fuel),
            Some(2500.0)
        );
        assert_eq!(
            extract("about 1.5 lakh on hotels").delta.get(SpendingCategory::HotelsAnnual),
            Some(150000.0)
        );
    }

    #[test]
    fn test_cadence_conversion_to_annual() {
        let extraction = extract(
            "I fly domestically every month, need lounge access, spend around 50k per month on flights",
        );
        assert_eq!(extraction.delta.get(SpendingCategory::FlightsAnnual), Some(600000.0));

        let extraction = extract("I travel internationally, spending about 2 lakhs annually");
        assert_eq!(extraction.delta.get(SpendingCategory::FlightsAnnual), Some(200000.0));
    }

    #[test]
    fn test_two_amounts_go_to_nearest_categories() {
        let extraction = extract("I spend 5k on dining and 10k on fuel");
        assert_eq!(extraction.delta.get(SpendingCategory::DiningOrGoingOut), Some(5000.0));
        assert_eq!(extraction.delta.get(SpendingCategory::Fuel), Some(10000.0));
    }

    #[test]
    fn test_small_bare_numbers_are_counts() {
        let extraction = extract("I use the airport lounge 3 times a quarter, and spend 4 on nothing");
        assert_eq!(
            extraction.delta.get(SpendingCategory::DomesticLoungeUsageQuarterly),
            Some(3.0)
        );

        let extraction = extract("I want 5% cashback on fuel");
        assert!(extraction.delta.is_empty());
    }

    #[test]
    fn test_specific_lounge_beats_generic() {
        let extraction = extract("I visit the international lounge 2 times a quarter");
        assert_eq!(
            extraction.delta.get(SpendingCategory::InternationalLoungeUsageQuarterly),
            Some(2.0)
        );
        assert!(!extraction.delta.is_set(SpendingCategory::DomesticLoungeUsageQuarterly));
    }

    #[test]
    fn test_amount_answers_previous_question() {
        let history = vec![
            ConversationTurn::user("I want offers on Amazon"),
            ConversationTurn::assistant(
                "Thanks! I'll factor in Amazon.",
                None,
                Some("How much do you usually spend on amazon each month?".to_string()),
            ),
        ];

        let extraction = HeuristicExtractor::new().extract_sync("around 5000", &history);
        assert_eq!(extraction.delta.get(SpendingCategory::AmazonSpends), Some(5000.0));
    }

    #[test]
    fn test_rent_is_not_matched_inside_words() {
        let extraction = extract("My current card gives 2000 points on different things");
        assert!(extraction.delta.is_empty());
    }

    #[test]
    fn test_nothing_found_asks_general_question() {
        let extraction = extract("hi there");
        assert!(extraction.delta.is_empty());
        assert!(extraction.follow_up.unwrap().contains("each month"));
    }

    #[test]
    fn test_asks_for_preference_when_no_intent() {
        let extraction = extract("I pay 20k rent");
        assert!(extraction.follow_up.unwrap().contains("What matters most"));

        let extraction = extract("I pay 20k rent and want cashback");
        assert_eq!(extraction.follow_up, None);
        assert_eq!(extraction.reply, "Got it: Rent ₹20,000/month.");
    }

    #[test]
    fn test_format_inr() {
        assert_eq!(format_inr(950.0), "950");
        assert_eq!(format_inr(20000.0), "20,000");
        assert_eq!(format_inr(120000.0), "1,20,000");
        assert_eq!(format_inr(12345678.0), "1,23,45,678");
    }
}
