//! 金額計算與客戶端金額核對。
//!
//! 所有金額以貨幣單位的 `f64` 表示，並在每一步四捨五入到分。

use crate::utils::error::{MarktError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// 四捨五入到小數兩位（遠離零）
pub fn round_money(value: f64) -> f64 {
    // 先收斂浮點誤差，例如 1.005 * 100 = 100.49999...
    let cents = (value * 100.0 * 1e6).round() / 1e6;
    cents.round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    Percent(f64),
    Fixed(f64),
}

impl Discount {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Discount::Percent(p) if !(0.0..=100.0).contains(&p) => Err(MarktError::validation(
                format!("percentage discount must be between 0 and 100, got {}", p),
            )),
            Discount::Fixed(a) if !a.is_finite() || a < 0.0 => Err(MarktError::validation(
                format!("fixed discount must be non-negative, got {}", a),
            )),
            _ => Ok(()),
        }
    }

    /// 折扣金額，不超過小計
    pub fn amount(&self, subtotal: f64) -> f64 {
        let raw = match *self {
            Discount::Percent(p) => subtotal * p / 100.0,
            Discount::Fixed(a) => a,
        };
        round_money(raw.min(subtotal).max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedLine {
    pub unit_price: f64,
    pub quantity: i64,
    pub line_discount: f64,
}

impl PricedLine {
    pub fn gross(&self) -> f64 {
        round_money(self.unit_price * self.quantity as f64)
    }

    pub fn total(&self) -> f64 {
        let gross = self.gross();
        round_money(gross - self.line_discount.min(gross))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedTotals {
    pub line_totals: Vec<f64>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
}

/// 客戶端送出的金額，欄位缺漏時不核對
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmittedTotals {
    pub subtotal: Option<f64>,
    pub discount: Option<f64>,
    pub tax: Option<f64>,
    pub total: Option<f64>,
}

pub fn compute_totals(
    lines: &[PricedLine],
    discount: Option<Discount>,
    tax_rate: f64,
) -> ComputedTotals {
    let line_totals: Vec<f64> = lines.iter().map(PricedLine::total).collect();
    let subtotal = round_money(line_totals.iter().sum());
    let discount = discount.map_or(0.0, |d| d.amount(subtotal));
    let taxable = round_money(subtotal - discount);
    let tax = round_money(taxable * tax_rate);
    let total = round_money(taxable + tax);

    ComputedTotals {
        line_totals,
        subtotal,
        discount,
        tax,
        total,
    }
}

pub fn reconcile(
    computed: &ComputedTotals,
    submitted: &SubmittedTotals,
    tolerance: f64,
) -> Result<()> {
    let checks = [
        ("subtotal", submitted.subtotal, computed.subtotal),
        ("discount", submitted.discount, computed.discount),
        ("tax", submitted.tax, computed.tax),
        ("total", submitted.total, computed.total),
    ];

    for (field, submitted, computed) in checks {
        if let Some(submitted) = submitted {
            // 容許一點浮點誤差，避免 0.01 的差距被判定超過 0.01
            if !submitted.is_finite() || (submitted - computed).abs() > tolerance + 1e-9 {
                return Err(MarktError::TotalsMismatch {
                    field,
                    submitted,
                    computed,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(unit_price: f64, quantity: i64) -> PricedLine {
        PricedLine {
            unit_price,
            quantity,
            line_discount: 0.0,
        }
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(1.005), 1.01);
        assert_eq!(round_money(2.675), 2.68);
        assert_eq!(round_money(-1.005), -1.01);
        assert_eq!(round_money(10.0), 10.0);
    }

    #[test]
    fn test_compute_totals_with_percent_discount_and_tax() {
        let totals = compute_totals(
            &[line(19.99, 2), line(5.50, 3)],
            Some(Discount::Percent(10.0)),
            0.16,
        );

        assert_eq!(totals.line_totals, vec![39.98, 16.5]);
        assert_eq!(totals.subtotal, 56.48);
        assert_eq!(totals.discount, 5.65);
        assert_eq!(totals.tax, 8.13);
        assert_eq!(totals.total, 58.96);
    }

    #[test]
    fn test_fixed_discount_is_capped_at_subtotal() {
        let totals = compute_totals(&[line(3.0, 1)], Some(Discount::Fixed(10.0)), 0.2);
        assert_eq!(totals.discount, 3.0);
        assert_eq!(totals.tax, 0.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn test_line_discount_is_capped_at_line_gross() {
        let priced = PricedLine {
            unit_price: 2.0,
            quantity: 2,
            line_discount: 9.0,
        };
        assert_eq!(priced.total(), 0.0);
    }

    #[test]
    fn test_reconcile_accepts_within_tolerance() {
        let totals = compute_totals(&[line(10.0, 1)], None, 0.15);
        let submitted = SubmittedTotals {
            subtotal: Some(10.0),
            discount: None,
            tax: Some(1.51),
            total: Some(11.49),
        };
        assert!(reconcile(&totals, &submitted, DEFAULT_TOLERANCE).is_ok());
    }

    #[test]
    fn test_reconcile_reports_first_mismatching_field() {
        let totals = compute_totals(&[line(10.0, 1)], None, 0.15);
        let submitted = SubmittedTotals {
            subtotal: Some(10.0),
            discount: Some(0.0),
            tax: Some(1.50),
            total: Some(11.00),
        };

        match reconcile(&totals, &submitted, DEFAULT_TOLERANCE) {
            Err(MarktError::TotalsMismatch {
                field,
                submitted,
                computed,
            }) => {
                assert_eq!(field, "total");
                assert_eq!(submitted, 11.0);
                assert_eq!(computed, 11.5);
            }
            other => panic!("expected totals mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_discount_validation() {
        assert!(Discount::Percent(100.0).validate().is_ok());
        assert!(Discount::Percent(120.0).validate().is_err());
        assert!(Discount::Fixed(-1.0).validate().is_err());
    }
}
