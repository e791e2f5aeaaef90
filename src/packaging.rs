//! # Packaging
//!
//! Expands one record into the labels of a packing run. The record's
//! quantity is the total piece count; [`PackagingOptions`] say how pieces go
//! into boxes, boxes into small cartons and small cartons into large
//! cartons. Every level is counted with ceiling division, so only the last
//! box or carton of a level can be partly full.
//!
//! ```text
//! pieces ─(pieces_per_box)→ boxes ─(boxes_per_small_carton)→ small cartons
//!                                  ─(small_cartons_per_large)→ large cartons
//! ```
//!
//! Box labels carry one serial each, counted up from the record's start
//! serial. Carton labels carry the serial range of the boxes inside, the
//! pieces those boxes hold and a `n/N` carton number.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LabelError;
use crate::model::{FieldValue, NormalizedRecord};
use crate::normalize::{ErrorPolicy, SkippedRecord};

/// Most labels one record may expand to.
pub const MAX_LABELS_PER_RECORD: u64 = 10_000;

/// Start serial used when a record has none.
const DEFAULT_SERIAL: &str = "DSK00001";

/// Which level of the hierarchy gets labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelLevel {
    #[default]
    Box,
    SmallCarton,
    LargeCarton,
}

/// How box serials count up from the start serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SerialScheme {
    /// `DSK00001`, `DSK00002`, ...
    #[default]
    Linear,
    /// `DSK00001-01` to `DSK00001-NN`, then `DSK00002-01`. The suffix counts
    /// boxes within a set (one small carton), the main number counts sets.
    Set,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackagingOptions {
    pub level: LabelLevel,
    pub scheme: SerialScheme,
    pub pieces_per_box: u32,
    /// Boxes per small carton. Without `small_cartons_per_large` there is no
    /// small carton level and this is the number of boxes per large carton.
    pub boxes_per_small_carton: u32,
    pub small_cartons_per_large: Option<u32>,
    /// Set scheme only: each set is spread over this many large cartons,
    /// earlier cartons taking the remainder.
    pub overweight_split: Option<u32>,
    /// Put an unnumbered label with the description and remark before the
    /// numbered labels of each record.
    pub blank_first_label: bool,
}

impl Default for PackagingOptions {
    fn default() -> Self {
        Self {
            level: LabelLevel::Box,
            scheme: SerialScheme::Linear,
            pieces_per_box: 1,
            boxes_per_small_carton: 1,
            small_cartons_per_large: None,
            overweight_split: None,
            blank_first_label: false,
        }
    }
}

impl PackagingOptions {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.pieces_per_box < 1 {
            return Err("pieces per box must be at least 1".to_string());
        }
        if self.boxes_per_small_carton < 1 {
            return Err("boxes per carton must be at least 1".to_string());
        }
        if self.small_cartons_per_large == Some(0) {
            return Err("small cartons per large carton must be at least 1".to_string());
        }
        if self.level == LabelLevel::SmallCarton && self.small_cartons_per_large.is_none() {
            return Err(
                "small carton labels need smallCartonsPerLarge (two-level packing has no small cartons)"
                    .to_string(),
            );
        }
        if let Some(split) = self.overweight_split {
            if split < 1 {
                return Err("overweight split must be at least 1".to_string());
            }
            if self.scheme != SerialScheme::Set || self.level != LabelLevel::LargeCarton {
                return Err("overweight split applies to large carton labels of the set scheme".to_string());
            }
            if self.small_cartons_per_large.is_some() {
                return Err("overweight split replaces smallCartonsPerLarge".to_string());
            }
        }
        Ok(())
    }

    fn boxes_per_large(&self) -> u64 {
        let per_small = self.boxes_per_small_carton.max(1) as u64;
        match self.small_cartons_per_large {
            Some(n) => per_small * n.max(1) as u64,
            None => per_small,
        }
    }
}

/// Box and carton counts for one piece total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackagingPlan {
    pub total_pieces: u64,
    pub pieces_per_box: u64,
    pub total_boxes: u64,
    /// `None` in two-level packing.
    pub total_small_cartons: Option<u64>,
    pub total_large_cartons: u64,
}

impl PackagingPlan {
    pub fn compute(total_pieces: u64, options: &PackagingOptions) -> Self {
        let pieces_per_box = options.pieces_per_box.max(1) as u64;
        let per_small = options.boxes_per_small_carton.max(1) as u64;
        let total_boxes = total_pieces.div_ceil(pieces_per_box);
        let sets = total_boxes.div_ceil(per_small);

        let (total_small_cartons, total_large_cartons) = match (
            options.small_cartons_per_large,
            options.overweight_split,
        ) {
            (Some(per_large), _) => (Some(sets), sets.div_ceil(per_large.max(1) as u64)),
            (None, Some(split)) => (None, sets.saturating_mul(split as u64)),
            (None, None) => (None, sets),
        };

        Self {
            total_pieces,
            pieces_per_box,
            total_boxes,
            total_small_cartons,
            total_large_cartons,
        }
    }

    /// Upper bound on the labels `level` produces.
    pub fn label_count(&self, level: LabelLevel) -> u64 {
        match level {
            LabelLevel::Box => self.total_boxes,
            LabelLevel::SmallCarton => self.total_small_cartons.unwrap_or(0),
            LabelLevel::LargeCarton => self.total_large_cartons,
        }
    }

    /// The boxes every label of `options.level` covers, in order.
    pub fn containers(&self, options: &PackagingOptions) -> Vec<Container> {
        let total = self.total_boxes;
        let per_small = options.boxes_per_small_carton.max(1) as u64;
        let ranges: Vec<(u64, u64)> = match options.level {
            LabelLevel::Box => (1..=total).map(|b| (b, b)).collect(),
            LabelLevel::SmallCarton => fixed_ranges(total, per_small),
            LabelLevel::LargeCarton => match options.overweight_split {
                Some(split) => fixed_ranges(total, per_small)
                    .into_iter()
                    .flat_map(|(first, last)| spread(first, last, split.max(1) as u64))
                    .collect(),
                None => fixed_ranges(total, options.boxes_per_large()),
            },
        };

        let of = ranges.len() as u64;
        ranges
            .into_iter()
            .zip(1..)
            .map(|((first_box, last_box), number)| Container {
                number,
                of,
                first_box,
                last_box,
            })
            .collect()
    }
}

/// The boxes behind one label, one-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub number: u64,
    pub of: u64,
    pub first_box: u64,
    pub last_box: u64,
}

impl Container {
    pub fn boxes(&self) -> u64 {
        self.last_box - self.first_box + 1
    }

    /// `n/N` as printed after "Carton No".
    pub fn carton_no(&self) -> String {
        format!("{}/{}", self.number, self.of)
    }
}

/// Consecutive runs of `per` boxes; the last run holds what is left.
fn fixed_ranges(total: u64, per: u64) -> Vec<(u64, u64)> {
    (0..total.div_ceil(per))
        .map(|i| {
            let first = i * per + 1;
            (first, first.saturating_add(per - 1).min(total))
        })
        .collect()
}

/// Divide `first..=last` over `parts` cartons, earlier ones taking the
/// remainder. Cartons that would stay empty are left out.
fn spread(first: u64, last: u64, parts: u64) -> Vec<(u64, u64)> {
    let size = last - first + 1;
    let base = size / parts;
    let extra = size % parts;
    let mut out = Vec::new();
    let mut next = first;
    for part in 0..parts {
        let len = base + u64::from(part < extra);
        if len == 0 {
            break;
        }
        out.push((next, next + len - 1));
        next += len;
    }
    out
}

/// A start serial split into the parts that count.
///
/// The prefix is everything before the first digit run, the number is that
/// run. A `-NN` directly after it is the set suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSerial {
    prefix: String,
    number: u64,
    width: usize,
    suffix: u64,
}

impl StartSerial {
    pub fn parse(serial: &str) -> Result<Self, String> {
        let serial = serial.trim();
        let start = serial
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("'{}' has no number to count from", serial))?;
        let digits = serial[start..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(serial.len(), |end| start + end);
        let run = &serial[start..digits];
        let number = run
            .parse::<u64>()
            .map_err(|_| format!("number '{}' is out of range", run))?;

        let suffix = match serial[digits..].strip_prefix('-') {
            Some(rest) => {
                let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                if end == 0 {
                    1
                } else {
                    rest[..end]
                        .parse::<u64>()
                        .map_err(|_| format!("suffix '{}' is out of range", &rest[..end]))?
                }
            }
            None => 1,
        };

        Ok(Self {
            prefix: serial[..start].to_string(),
            number,
            width: run.len(),
            suffix,
        })
    }

    /// Serial of the box at one-based position `box_no`.
    pub fn box_serial(
        &self,
        scheme: SerialScheme,
        boxes_per_set: u64,
        box_no: u64,
    ) -> Result<String, String> {
        let index = box_no.saturating_sub(1);
        let overflow = || format!("box {} counts past the largest serial", box_no);
        match scheme {
            SerialScheme::Linear => {
                let n = self.number.checked_add(index).ok_or_else(overflow)?;
                Ok(format!("{}{:0width$}", self.prefix, n, width = self.width))
            }
            SerialScheme::Set => {
                let per = boxes_per_set.max(1);
                let main = self.number.checked_add(index / per).ok_or_else(overflow)?;
                let suffix = self.suffix.checked_add(index % per).ok_or_else(overflow)?;
                Ok(format!(
                    "{}{:0width$}-{:02}",
                    self.prefix,
                    main,
                    suffix,
                    width = self.width
                ))
            }
        }
    }

    /// `FIRST-LAST` for the boxes of `container`.
    pub fn range(
        &self,
        scheme: SerialScheme,
        boxes_per_set: u64,
        container: &Container,
    ) -> Result<String, String> {
        Ok(format!(
            "{}-{}",
            self.box_serial(scheme, boxes_per_set, container.first_box)?,
            self.box_serial(scheme, boxes_per_set, container.last_box)?
        ))
    }
}

/// Expand one record into its box or carton labels.
pub fn expand(
    record: &NormalizedRecord,
    options: &PackagingOptions,
) -> Result<Vec<NormalizedRecord>, LabelError> {
    let row = record.row_index;
    let qty = record.quantity();
    if !(qty >= 0.0) || qty.fract() != 0.0 {
        return Err(LabelError::validation(
            "qty",
            row,
            format!("must be a whole, non-negative piece count, got {}", qty),
        ));
    }

    let plan = PackagingPlan::compute(qty as u64, options);
    let count = plan.label_count(options.level);
    if count > MAX_LABELS_PER_RECORD {
        return Err(LabelError::validation(
            "qty",
            row,
            format!(
                "{} pieces make {} labels, more than the limit of {}",
                plan.total_pieces, count, MAX_LABELS_PER_RECORD
            ),
        ));
    }

    let serial = record.text("serial", 0);
    let start = StartSerial::parse(if serial.is_empty() {
        DEFAULT_SERIAL
    } else {
        &serial
    })
    .map_err(|reason| LabelError::validation("serial", row, reason))?;

    let per_set = options.boxes_per_small_carton.max(1) as u64;
    let mut labels = Vec::with_capacity(count as usize + 1);
    if options.blank_first_label {
        labels.push(blank_label(record));
    }
    for container in plan.containers(options) {
        let mut label = record.clone();
        let (serial, pieces) = if options.level == LabelLevel::Box {
            (
                start.box_serial(options.scheme, per_set, container.first_box),
                plan.pieces_per_box,
            )
        } else {
            label.fields.insert(
                "carton".to_string(),
                FieldValue::Text(container.carton_no()),
            );
            (
                start.range(options.scheme, per_set, &container),
                container.boxes().saturating_mul(plan.pieces_per_box),
            )
        };
        let serial = serial.map_err(|reason| LabelError::validation("serial", row, reason))?;
        label
            .fields
            .insert("serial".to_string(), FieldValue::Text(serial));
        label
            .fields
            .insert("qty".to_string(), FieldValue::Quantity(pieces as f64));
        labels.push(label);
    }

    tracing::debug!(row, labels = labels.len(), level = ?options.level, "expanded packing run");
    Ok(labels)
}

/// The unnumbered label: description (or name) as title, remark below, no
/// quantity or serial.
fn blank_label(record: &NormalizedRecord) -> NormalizedRecord {
    let description = record.text("description", 0);
    let title = if description.is_empty() {
        record.name()
    } else {
        description
    };
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), FieldValue::Text(title));
    let remark = record.text("remark", 0);
    if !remark.is_empty() {
        fields.insert("remark".to_string(), FieldValue::Text(remark));
    }
    NormalizedRecord {
        row_index: record.row_index,
        kind: record.kind,
        fields,
        sub_boxes: Vec::new(),
        children: Vec::new(),
    }
}

/// Expand every record under `policy`, keeping input order.
pub fn expand_all(
    records: Vec<NormalizedRecord>,
    options: &PackagingOptions,
    policy: ErrorPolicy,
) -> Result<(Vec<NormalizedRecord>, Vec<SkippedRecord>), LabelError> {
    let mut labels = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for record in &records {
        match expand(record, options) {
            Ok(expanded) => labels.extend(expanded),
            Err(error) if policy == ErrorPolicy::SkipRecord && error.is_record_level() => {
                tracing::warn!(row = record.row_index, %error, "skipping record that cannot be packed");
                skipped.push(SkippedRecord {
                    row: record.row_index,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }
    Ok((labels, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateKind;

    fn record(qty: f64, serial: &str) -> NormalizedRecord {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Text("Tickets".to_string()));
        fields.insert("qty".to_string(), FieldValue::Quantity(qty));
        fields.insert("serial".to_string(), FieldValue::Text(serial.to_string()));
        fields.insert("description".to_string(), FieldValue::Text("Scratch cards".to_string()));
        fields.insert("remark".to_string(), FieldValue::Text("C-042".to_string()));
        NormalizedRecord {
            row_index: 3,
            kind: TemplateKind::Regular,
            fields,
            sub_boxes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn three_level(level: LabelLevel) -> PackagingOptions {
        PackagingOptions {
            level,
            pieces_per_box: 100,
            boxes_per_small_carton: 5,
            small_cartons_per_large: Some(2),
            ..Default::default()
        }
    }

    fn texts(labels: &[NormalizedRecord], field: &str) -> Vec<String> {
        labels.iter().map(|l| l.text(field, 0)).collect()
    }

    #[test]
    fn test_plan_counts_with_ceiling() {
        let plan = PackagingPlan::compute(1050, &three_level(LabelLevel::Box));
        assert_eq!(plan.total_boxes, 11);
        assert_eq!(plan.total_small_cartons, Some(3));
        assert_eq!(plan.total_large_cartons, 2);
    }

    #[test]
    fn test_box_labels_count_up_from_start() {
        let labels = expand(&record(1050.0, "DSK00001"), &three_level(LabelLevel::Box)).unwrap();
        assert_eq!(labels.len(), 11);
        assert_eq!(labels[0].text("serial", 0), "DSK00001");
        assert_eq!(labels[10].text("serial", 0), "DSK00011");
        assert!(labels.iter().all(|l| l.quantity() == 100.0));
        assert!(labels.iter().all(|l| !l.fields.contains_key("carton")));
    }

    #[test]
    fn test_small_cartons_with_partial_last() {
        let labels =
            expand(&record(1050.0, "DSK00001"), &three_level(LabelLevel::SmallCarton)).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec!["DSK00001-DSK00005", "DSK00006-DSK00010", "DSK00011-DSK00011"]
        );
        assert_eq!(texts(&labels, "carton"), vec!["1/3", "2/3", "3/3"]);
        let pieces: Vec<f64> = labels.iter().map(|l| l.quantity()).collect();
        assert_eq!(pieces, vec![500.0, 500.0, 100.0]);
        assert_eq!(labels[2].text("remark", 0), "C-042");
    }

    #[test]
    fn test_large_cartons_span_small_cartons() {
        let labels =
            expand(&record(1050.0, "DSK00001"), &three_level(LabelLevel::LargeCarton)).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec!["DSK00001-DSK00010", "DSK00011-DSK00011"]
        );
        assert_eq!(texts(&labels, "carton"), vec!["1/2", "2/2"]);
        assert_eq!(labels[0].quantity(), 1000.0);
        assert_eq!(labels[1].quantity(), 100.0);
    }

    #[test]
    fn test_two_level_packs_boxes_into_cartons() {
        let options = PackagingOptions {
            level: LabelLevel::LargeCarton,
            pieces_per_box: 100,
            boxes_per_small_carton: 4,
            ..Default::default()
        };
        let labels = expand(&record(1050.0, "PX0090"), &options).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec!["PX0090-PX0093", "PX0094-PX0097", "PX0098-PX0100"]
        );
        assert_eq!(labels[2].quantity(), 300.0);
        assert_eq!(labels[2].text("carton", 0), "3/3");
    }

    #[test]
    fn test_set_scheme_box_serials() {
        let options = PackagingOptions {
            scheme: SerialScheme::Set,
            boxes_per_small_carton: 3,
            ..Default::default()
        };
        let labels = expand(&record(7.0, "JAW01001-01"), &options).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec![
                "JAW01001-01",
                "JAW01001-02",
                "JAW01001-03",
                "JAW01002-01",
                "JAW01002-02",
                "JAW01002-03",
                "JAW01003-01",
            ]
        );
    }

    #[test]
    fn test_set_scheme_carton_ranges() {
        let options = PackagingOptions {
            level: LabelLevel::SmallCarton,
            scheme: SerialScheme::Set,
            boxes_per_small_carton: 3,
            small_cartons_per_large: Some(2),
            ..Default::default()
        };
        let labels = expand(&record(7.0, "JAW01001"), &options).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec![
                "JAW01001-01-JAW01001-03",
                "JAW01002-01-JAW01002-03",
                "JAW01003-01-JAW01003-01",
            ]
        );
    }

    #[test]
    fn test_overweight_split_spreads_each_set() {
        let options = PackagingOptions {
            level: LabelLevel::LargeCarton,
            scheme: SerialScheme::Set,
            boxes_per_small_carton: 5,
            overweight_split: Some(2),
            ..Default::default()
        };
        let labels = expand(&record(10.0, "JAW01001-01"), &options).unwrap();
        assert_eq!(
            texts(&labels, "serial"),
            vec![
                "JAW01001-01-JAW01001-03",
                "JAW01001-04-JAW01001-05",
                "JAW01002-01-JAW01002-03",
                "JAW01002-04-JAW01002-05",
            ]
        );
        assert_eq!(texts(&labels, "carton"), vec!["1/4", "2/4", "3/4", "4/4"]);
        let pieces: Vec<f64> = labels.iter().map(|l| l.quantity()).collect();
        assert_eq!(pieces, vec![3.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn test_overweight_partial_set_drops_empty_cartons() {
        let options = PackagingOptions {
            level: LabelLevel::LargeCarton,
            scheme: SerialScheme::Set,
            boxes_per_small_carton: 5,
            overweight_split: Some(3),
            ..Default::default()
        };
        let plan = PackagingPlan::compute(7, &options);
        let sizes: Vec<u64> = plan.containers(&options).iter().map(|c| c.boxes()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_blank_first_label_leads() {
        let options = PackagingOptions {
            blank_first_label: true,
            ..three_level(LabelLevel::SmallCarton)
        };
        let labels = expand(&record(1050.0, "DSK00001"), &options).unwrap();
        assert_eq!(labels.len(), 4);
        let blank = &labels[0];
        assert_eq!(blank.name(), "Scratch cards");
        assert_eq!(blank.text("remark", 0), "C-042");
        assert!(!blank.fields.contains_key("qty"));
        assert!(!blank.fields.contains_key("serial"));
        assert_eq!(labels[1].text("carton", 0), "1/3");
    }

    #[test]
    fn test_blank_serial_uses_default_start() {
        let labels = expand(&record(2.0, ""), &PackagingOptions::default()).unwrap();
        assert_eq!(texts(&labels, "serial"), vec!["DSK00001", "DSK00002"]);
    }

    #[test]
    fn test_zero_pieces_give_no_labels() {
        let labels = expand(&record(0.0, "DSK00001"), &three_level(LabelLevel::LargeCarton)).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_label_limit_is_validation_error() {
        let err = expand(&record(1e12, "DSK00001"), &PackagingOptions::default()).unwrap_err();
        assert!(matches!(err, LabelError::Validation { ref field, row: 3, .. } if field == "qty"));
    }

    #[test]
    fn test_fractional_pieces_rejected() {
        let err = expand(&record(2.5, "DSK00001"), &PackagingOptions::default()).unwrap_err();
        assert!(matches!(err, LabelError::Validation { ref field, .. } if field == "qty"));
    }

    #[test]
    fn test_serial_overflow_is_validation_error() {
        let err =
            expand(&record(2.0, "A18446744073709551615"), &PackagingOptions::default()).unwrap_err();
        assert!(matches!(err, LabelError::Validation { ref field, .. } if field == "serial"));
        let err = expand(&record(1.0, "A99999999999999999999"), &PackagingOptions::default())
            .unwrap_err();
        assert!(matches!(err, LabelError::Validation { ref field, .. } if field == "serial"));
    }

    #[test]
    fn test_serial_without_digits_rejected() {
        assert!(StartSerial::parse("BOX").is_err());
        let start = StartSerial::parse("AB-7").unwrap();
        assert_eq!(start.box_serial(SerialScheme::Linear, 1, 3).unwrap(), "AB-9");
    }

    #[test]
    fn test_options_validation() {
        assert!(PackagingOptions::default().validate().is_ok());
        let missing_small = PackagingOptions {
            level: LabelLevel::SmallCarton,
            ..Default::default()
        };
        assert!(missing_small.validate().is_err());
        let linear_overweight = PackagingOptions {
            level: LabelLevel::LargeCarton,
            overweight_split: Some(2),
            ..Default::default()
        };
        assert!(linear_overweight.validate().is_err());
        let zero = PackagingOptions {
            pieces_per_box: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_skip_policy_keeps_other_records() {
        let mut bad = record(2.5, "DSK00001");
        bad.row_index = 1;
        let records = vec![record(2.0, "DSK00001"), bad];
        let (labels, skipped) =
            expand_all(records.clone(), &PackagingOptions::default(), ErrorPolicy::SkipRecord)
                .unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].row, 1);
        assert!(expand_all(records, &PackagingOptions::default(), ErrorPolicy::Abort).is_err());
    }
}
