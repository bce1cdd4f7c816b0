//! Spending schema and the accumulated spending record
//!
//! The recommendation service understands a fixed set of spending keys.
//! A [`SpendingRecord`] only ever holds keys from that set. A key that is
//! absent is "unset" (never mentioned); a key present with `0` is an
//! explicit zero spend.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// How often the amount stored for a category is incurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Monthly,
    Quarterly,
    Annual,
}

impl Cadence {
    /// Number of periods of this cadence in one year
    pub fn periods_per_year(self) -> f64 {
        match self {
            Cadence::Monthly => 12.0,
            Cadence::Quarterly => 4.0,
            Cadence::Annual => 1.0,
        }
    }

    /// Convert an amount stated at `self` cadence into `target` cadence
    pub fn convert(self, amount: f64, target: Cadence) -> f64 {
        amount * self.periods_per_year() / target.periods_per_year()
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Annual => "annual",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Categories =================
//

/// One recognised spending bucket. Declaration order is the order keys are
/// listed in prompts and serialized records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpendingCategory {
    AmazonSpends,
    FlipkartSpends,
    GrocerySpendsOnline,
    OnlineFoodOrdering,
    OtherOnlineSpends,
    OtherOfflineSpends,
    DiningOrGoingOut,
    Fuel,
    SchoolFees,
    Rent,
    MobilePhoneBills,
    ElectricityBills,
    WaterBills,
    OttChannels,
    NewMonthlyCat1,
    NewMonthlyCat2,
    NewMonthlyCat3,
    HotelsAnnual,
    FlightsAnnual,
    InsuranceHealthAnnual,
    InsuranceCarOrBikeAnnual,
    LargeElectronicsPurchase,
    AllPharmacy,
    NewCat1,
    NewCat2,
    NewCat3,
    DomesticLoungeUsageQuarterly,
    InternationalLoungeUsageQuarterly,
    RailwayLoungeUsageQuarterly,
    MovieUsage,
    MovieMov,
    DiningUsage,
    DiningMov,
}

impl SpendingCategory {
    pub const ALL: [SpendingCategory; 33] = [
        SpendingCategory::AmazonSpends,
        SpendingCategory::FlipkartSpends,
        SpendingCategory::GrocerySpendsOnline,
        SpendingCategory::OnlineFoodOrdering,
        SpendingCategory::OtherOnlineSpends,
        SpendingCategory::OtherOfflineSpends,
        SpendingCategory::DiningOrGoingOut,
        SpendingCategory::Fuel,
        SpendingCategory::SchoolFees,
        SpendingCategory::Rent,
        SpendingCategory::MobilePhoneBills,
        SpendingCategory::ElectricityBills,
        SpendingCategory::WaterBills,
        SpendingCategory::OttChannels,
        SpendingCategory::NewMonthlyCat1,
        SpendingCategory::NewMonthlyCat2,
        SpendingCategory::NewMonthlyCat3,
        SpendingCategory::HotelsAnnual,
        SpendingCategory::FlightsAnnual,
        SpendingCategory::InsuranceHealthAnnual,
        SpendingCategory::InsuranceCarOrBikeAnnual,
        SpendingCategory::LargeElectronicsPurchase,
        SpendingCategory::AllPharmacy,
        SpendingCategory::NewCat1,
        SpendingCategory::NewCat2,
        SpendingCategory::NewCat3,
        SpendingCategory::DomesticLoungeUsageQuarterly,
        SpendingCategory::InternationalLoungeUsageQuarterly,
        SpendingCategory::RailwayLoungeUsageQuarterly,
        SpendingCategory::MovieUsage,
        SpendingCategory::MovieMov,
        SpendingCategory::DiningUsage,
        SpendingCategory::DiningMov,
    ];

    /// Wire key understood by the recommendation service
    pub fn key(self) -> &'static str {
        use SpendingCategory::*;
        match self {
            AmazonSpends => "amazon_spends",
            FlipkartSpends => "flipkart_spends",
            GrocerySpendsOnline => "grocery_spends_online",
            OnlineFoodOrdering => "online_food_ordering",
            OtherOnlineSpends => "other_online_spends",
            OtherOfflineSpends => "other_offline_spends",
            DiningOrGoingOut => "dining_or_going_out",
            Fuel => "fuel",
            SchoolFees => "school_fees",
            Rent => "rent",
            MobilePhoneBills => "mobile_phone_bills",
            ElectricityBills => "electricity_bills",
            WaterBills => "water_bills",
            OttChannels => "ott_channels",
            NewMonthlyCat1 => "new_monthly_cat_1",
            NewMonthlyCat2 => "new_monthly_cat_2",
            NewMonthlyCat3 => "new_monthly_cat_3",
            HotelsAnnual => "hotels_annual",
            FlightsAnnual => "flights_annual",
            InsuranceHealthAnnual => "insurance_health_annual",
            InsuranceCarOrBikeAnnual => "insurance_car_or_bike_annual",
            LargeElectronicsPurchase => "large_electronics_purchase_like_mobile_tv_etc",
            AllPharmacy => "all_pharmacy",
            NewCat1 => "new_cat_1",
            NewCat2 => "new_cat_2",
            NewCat3 => "new_cat_3",
            DomesticLoungeUsageQuarterly => "domestic_lounge_usage_quarterly",
            InternationalLoungeUsageQuarterly => "international_lounge_usage_quarterly",
            RailwayLoungeUsageQuarterly => "railway_lounge_usage_quarterly",
            MovieUsage => "movie_usage",
            MovieMov => "movie_mov",
            DiningUsage => "dining_usage",
            DiningMov => "dining_mov",
        }
    }

    pub fn display_name(self) -> &'static str {
        use SpendingCategory::*;
        match self {
            AmazonSpends => "Amazon",
            FlipkartSpends => "Flipkart",
            GrocerySpendsOnline => "Online groceries",
            OnlineFoodOrdering => "Food delivery",
            OtherOnlineSpends => "Other online shopping",
            OtherOfflineSpends => "Offline shopping",
            DiningOrGoingOut => "Dining out",
            Fuel => "Fuel",
            SchoolFees => "School fees",
            Rent => "Rent",
            MobilePhoneBills => "Mobile bills",
            ElectricityBills => "Electricity bills",
            WaterBills => "Water bills",
            OttChannels => "OTT subscriptions",
            NewMonthlyCat1 | NewMonthlyCat2 | NewMonthlyCat3 => "Other monthly",
            HotelsAnnual => "Hotels",
            FlightsAnnual => "Flights",
            InsuranceHealthAnnual => "Health insurance",
            InsuranceCarOrBikeAnnual => "Vehicle insurance",
            LargeElectronicsPurchase => "Electronics",
            AllPharmacy => "Pharmacy",
            NewCat1 | NewCat2 | NewCat3 => "Other annual",
            DomesticLoungeUsageQuarterly => "Domestic lounge visits",
            InternationalLoungeUsageQuarterly => "International lounge visits",
            RailwayLoungeUsageQuarterly => "Railway lounge visits",
            MovieUsage => "Movie tickets",
            MovieMov => "Movie ticket value",
            DiningUsage => "Dining visits",
            DiningMov => "Dining bill value",
        }
    }

    pub fn cadence(self) -> Cadence {
        use SpendingCategory::*;
        match self {
            HotelsAnnual | FlightsAnnual | InsuranceHealthAnnual | InsuranceCarOrBikeAnnual
            | LargeElectronicsPurchase | AllPharmacy | NewCat1 | NewCat2 | NewCat3 => {
                Cadence::Annual
            }
            DomesticLoungeUsageQuarterly
            | InternationalLoungeUsageQuarterly
            | RailwayLoungeUsageQuarterly => Cadence::Quarterly,
            _ => Cadence::Monthly,
        }
    }

    /// Whether the value counts occurrences (visits, tickets) rather than rupees
    pub fn is_usage_count(self) -> bool {
        use SpendingCategory::*;
        matches!(
            self,
            DomesticLoungeUsageQuarterly
                | InternationalLoungeUsageQuarterly
                | RailwayLoungeUsageQuarterly
                | MovieUsage
                | DiningUsage
        )
    }

    /// Look up a category by its wire key after normalization
    pub fn from_key(raw: &str) -> Option<Self> {
        let key = normalize_key(raw);
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }
}

impl fmt::Display for SpendingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for SpendingCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for SpendingCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SpendingCategory::from_key(&raw)
            .ok_or_else(|| D::Error::custom(format!("unknown spending category: {}", raw)))
    }
}

/// Lower-case and collapse whitespace runs to `_` ("Amazon Spends" → "amazon_spends")
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

//
// ================= Validation =================
//

/// Counts of fields corrected while reading untrusted spending data.
/// Never shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Keys outside the known category set
    pub dropped_unknown: usize,
    /// Known keys whose value was not a finite, non-negative number
    pub coerced_invalid: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_unknown == 0 && self.coerced_invalid == 0
    }

    pub fn total(&self) -> usize {
        self.dropped_unknown + self.coerced_invalid
    }
}

//
// ================= Record =================
//

/// Spending amounts keyed by category. Absent means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendingRecord {
    amounts: BTreeMap<SpendingCategory, f64>,
}

impl SpendingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read untrusted JSON (completion output or client state).
    ///
    /// Unknown keys and malformed values are dropped and counted; `null`
    /// means unset and is not counted.
    pub fn from_untrusted(map: &Map<String, Value>) -> (Self, ValidationReport) {
        let mut record = Self::new();
        let mut report = ValidationReport::default();

        for (raw_key, value) in map {
            let Some(category) = SpendingCategory::from_key(raw_key) else {
                report.dropped_unknown += 1;
                continue;
            };

            match value {
                Value::Null => {}
                Value::Number(n) => match n.as_f64() {
                    Some(amount) if amount.is_finite() && amount >= 0.0 => {
                        record.amounts.insert(category, amount);
                    }
                    _ => report.coerced_invalid += 1,
                },
                _ => report.coerced_invalid += 1,
            }
        }

        (record, report)
    }

    pub fn get(&self, category: SpendingCategory) -> Option<f64> {
        self.amounts.get(&category).copied()
    }

    /// Set an amount. Negative and non-finite amounts are ignored.
    pub fn set(&mut self, category: SpendingCategory, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 {
            return false;
        }
        self.amounts.insert(category, amount);
        true
    }

    pub fn with(mut self, category: SpendingCategory, amount: f64) -> Self {
        self.set(category, amount);
        self
    }

    pub fn is_set(&self, category: SpendingCategory) -> bool {
        self.amounts.contains_key(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpendingCategory, f64)> + '_ {
        self.amounts.iter().map(|(c, a)| (*c, *a))
    }

    /// Last write wins per category; categories absent from `delta` keep
    /// their current value.
    pub fn merge(&mut self, delta: &SpendingRecord) {
        for (category, amount) in delta.iter() {
            self.amounts.insert(category, amount);
        }
    }

    pub fn merged(&self, delta: &SpendingRecord) -> SpendingRecord {
        let mut out = self.clone();
        out.merge(delta);
        out
    }

    pub fn has_positive_amount(&self) -> bool {
        self.amounts.values().any(|a| *a > 0.0)
    }

    /// Every known key, unset ones filled with zero, in schema order
    pub fn zero_filled(&self) -> Map<String, Value> {
        SpendingCategory::ALL
            .iter()
            .map(|c| {
                (
                    c.key().to_string(),
                    amount_to_json(self.get(*c).unwrap_or(0.0)),
                )
            })
            .collect()
    }
}

impl FromIterator<(SpendingCategory, f64)> for SpendingRecord {
    fn from_iter<I: IntoIterator<Item = (SpendingCategory, f64)>>(iter: I) -> Self {
        let mut record = SpendingRecord::new();
        for (category, amount) in iter {
            record.set(category, amount);
        }
        record
    }
}

/// Whole amounts go out as integers so upstream sees `20000`, not `20000.0`
pub fn amount_to_json(amount: f64) -> Value {
    if amount.fract() == 0.0 && amount >= 0.0 && amount <= u64::MAX as f64 {
        Value::from(amount as u64)
    } else {
        Value::from(amount)
    }
}

impl Serialize for SpendingRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.amounts.len()))?;
        for (category, amount) in self.iter() {
            map.serialize_entry(category.key(), &amount_to_json(amount))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SpendingRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(SpendingRecord::new()),
            Value::Object(map) => {
                let (record, report) = SpendingRecord::from_untrusted(&map);
                if !report.is_clean() {
                    tracing::debug!(
                        dropped_unknown = report.dropped_unknown,
                        coerced_invalid = report.coerced_invalid,
                        "Sanitized inbound spending record"
                    );
                }
                Ok(record)
            }
            _ => Err(D::Error::custom("spending record must be a JSON object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_category_key_round_trips() {
        for category in SpendingCategory::ALL {
            assert_eq!(SpendingCategory::from_key(category.key()), Some(category));
        }
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            SpendingCategory::from_key("Amazon  Spends"),
            Some(SpendingCategory::AmazonSpends)
        );
        assert_eq!(SpendingCategory::from_key(" FUEL "), Some(SpendingCategory::Fuel));
        assert_eq!(SpendingCategory::from_key("crypto"), None);
    }

    #[test]
    fn test_cadences() {
        assert_eq!(SpendingCategory::Rent.cadence(), Cadence::Monthly);
        assert_eq!(SpendingCategory::FlightsAnnual.cadence(), Cadence::Annual);
        assert_eq!(
            SpendingCategory::DomesticLoungeUsageQuarterly.cadence(),
            Cadence::Quarterly
        );
        assert_eq!(Cadence::Monthly.convert(50_000.0, Cadence::Annual), 600_000.0);
        assert_eq!(Cadence::Annual.convert(120_000.0, Cadence::Monthly), 10_000.0);
    }

    #[test]
    fn test_untrusted_input_keeps_only_known_keys() {
        let raw = json!({
            "rent": 20000,
            "fuel": "lots",
            "bitcoin": 5000,
            "amazon_spends": null,
            "dining_or_going_out": -10,
            "Flipkart Spends": 3000
        });

        let (record, report) = SpendingRecord::from_untrusted(raw.as_object().unwrap());

        assert_eq!(record.get(SpendingCategory::Rent), Some(20000.0));
        assert_eq!(record.get(SpendingCategory::FlipkartSpends), Some(3000.0));
        assert!(!record.is_set(SpendingCategory::Fuel));
        assert!(!record.is_set(SpendingCategory::AmazonSpends));
        assert!(!record.is_set(SpendingCategory::DiningOrGoingOut));
        assert_eq!(record.len(), 2);
        assert_eq!(report.dropped_unknown, 1);
        assert_eq!(report.coerced_invalid, 2);
    }

    #[test]
    fn test_unset_is_distinct_from_zero() {
        let raw = json!({ "fuel": 0 });
        let (record, _) = SpendingRecord::from_untrusted(raw.as_object().unwrap());

        assert!(record.is_set(SpendingCategory::Fuel));
        assert!(!record.is_set(SpendingCategory::Rent));
        assert!(!record.has_positive_amount());
    }

    #[test]
    fn test_merge_is_last_write_wins_per_category() {
        let mut acc = SpendingRecord::new()
            .with(SpendingCategory::Rent, 20000.0)
            .with(SpendingCategory::Fuel, 3000.0);
        let delta = SpendingRecord::new()
            .with(SpendingCategory::Fuel, 4000.0)
            .with(SpendingCategory::AmazonSpends, 5000.0);

        acc.merge(&delta);

        assert_eq!(acc.get(SpendingCategory::Rent), Some(20000.0));
        assert_eq!(acc.get(SpendingCategory::Fuel), Some(4000.0));
        assert_eq!(acc.get(SpendingCategory::AmazonSpends), Some(5000.0));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = SpendingRecord::new().with(SpendingCategory::Rent, 20000.0);
        let delta = SpendingRecord::new()
            .with(SpendingCategory::Rent, 25000.0)
            .with(SpendingCategory::FlipkartSpends, 3000.0);

        let once = base.merged(&delta);
        let twice = once.merged(&delta);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_zero_filled_payload_has_every_key() {
        let record = SpendingRecord::new().with(SpendingCategory::Rent, 20000.0);
        let payload = record.zero_filled();

        assert_eq!(payload.len(), SpendingCategory::ALL.len());
        assert_eq!(payload["rent"], json!(20000));
        assert_eq!(payload["hotels_annual"], json!(0));
    }

    #[test]
    fn test_serde_shape() {
        let record = SpendingRecord::new()
            .with(SpendingCategory::AmazonSpends, 5000.0)
            .with(SpendingCategory::DiningMov, 1250.5);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({ "amazon_spends": 5000, "dining_mov": 1250.5 }));

        let back: SpendingRecord =
            serde_json::from_value(json!({ "amazon_spends": 5000, "junk": 1 })).unwrap();
        assert_eq!(back.get(SpendingCategory::AmazonSpends), Some(5000.0));
        assert_eq!(back.len(), 1);

        let empty: SpendingRecord = serde_json::from_value(Value::Null).unwrap();
        assert!(empty.is_empty());
        assert!(serde_json::from_value::<SpendingRecord>(json!([1, 2])).is_err());
    }
}
