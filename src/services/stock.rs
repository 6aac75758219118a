// src/services/stock.rs

use std::collections::HashMap;

use crate::models::{
    inventory::{StockDecrement, StockFailure, StockLevel},
    sales::LineItem,
};

/// Decide a baixa de estoque de uma venda contra os saldos já travados.
///
/// Quantidades do mesmo SKU são somadas antes da conferência. Ou todos os SKUs
/// passam e a lista de decrementos é devolvida, ou nada é baixado e todas as
/// falhas são devolvidas juntas.
pub fn plan_deduction(
    lines: &[LineItem],
    on_hand: &[StockLevel],
) -> Result<Vec<StockDecrement>, Vec<StockFailure>> {
    let available: HashMap<&str, i32> = on_hand
        .iter()
        .map(|level| (level.sku.as_str(), level.quantity))
        .collect();

    let mut plan = Vec::new();
    let mut failures = Vec::new();

    for (sku, needed) in aggregate(lines) {
        // Total acima de i32 nunca cabe no saldo; reporta saturado
        let reported = i32::try_from(needed).unwrap_or(i32::MAX);
        match available.get(sku) {
            None => failures.push(StockFailure::not_found(sku, reported)),
            Some(&qty) if i64::from(qty) < needed => {
                failures.push(StockFailure::insufficient(sku, reported, qty))
            }
            Some(_) => plan.push(StockDecrement {
                sku: sku.to_string(),
                quantity: reported,
            }),
        }
    }

    if !failures.is_empty() {
        return Err(failures);
    }
    Ok(plan)
}

/// Soma as quantidades por SKU (em i64) mantendo a ordem da primeira aparição no carrinho.
pub fn aggregate(lines: &[LineItem]) -> Vec<(&str, i64)> {
    let mut out: Vec<(&str, i64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for line in lines {
        let quantity = i64::from(line.quantity);
        match index.get(line.sku.as_str()) {
            Some(&i) => out[i].1 += quantity,
            None => {
                index.insert(line.sku.as_str(), out.len());
                out.push((line.sku.as_str(), quantity));
            }
        }
    }
    out
}

/// SKUs distintos do carrinho, ordenados (ordem estável para `FOR UPDATE`).
pub fn distinct_skus(lines: &[LineItem]) -> Vec<String> {
    let mut skus: Vec<String> = lines.iter().map(|l| l.sku.clone()).collect();
    skus.sort();
    skus.dedup();
    skus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inventory::StockFailureReason;
    use rust_decimal::Decimal;

    fn line(sku: &str, quantity: i32) -> LineItem {
        LineItem {
            sku: sku.to_string(),
            quantity,
            unit_price: Decimal::new(1000, 2),
        }
    }

    fn level(sku: &str, quantity: i32) -> StockLevel {
        StockLevel {
            sku: sku.to_string(),
            quantity,
        }
    }

    #[test]
    fn plans_every_line_when_stock_is_enough() {
        let plan = plan_deduction(
            &[line("A", 2), line("B", 1)],
            &[level("A", 5), level("B", 3)],
        )
        .unwrap();

        assert_eq!(
            plan,
            vec![
                StockDecrement { sku: "A".into(), quantity: 2 },
                StockDecrement { sku: "B".into(), quantity: 1 },
            ]
        );
    }

    #[test]
    fn reports_insufficient_sku_with_needed_and_available() {
        let failures = plan_deduction(
            &[line("A", 2), line("B", 1)],
            &[level("A", 5), level("B", 0)],
        )
        .unwrap_err();

        assert_eq!(failures, vec![StockFailure::insufficient("B", 1, 0)]);
        assert!(failures[0].message().contains("necessário 1, disponível 0"));
    }

    #[test]
    fn repeated_sku_is_checked_against_its_total() {
        let failures = plan_deduction(&[line("A", 2), line("A", 2)], &[level("A", 3)]).unwrap_err();
        assert_eq!(failures, vec![StockFailure::insufficient("A", 4, 3)]);

        let plan = plan_deduction(&[line("A", 2), line("A", 1)], &[level("A", 3)]).unwrap();
        assert_eq!(plan, vec![StockDecrement { sku: "A".into(), quantity: 3 }]);
    }

    #[test]
    fn unknown_sku_fails_and_all_failures_are_collected() {
        let failures = plan_deduction(
            &[line("X", 1), line("A", 9)],
            &[level("A", 1)],
        )
        .unwrap_err();

        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].reason, StockFailureReason::NotFound);
        assert_eq!(failures[1].reason, StockFailureReason::Insufficient);
    }

    #[test]
    fn repeated_sku_total_beyond_i32_is_insufficient() {
        let failures = plan_deduction(
            &[line("A", i32::MAX), line("A", 1)],
            &[level("A", 5)],
        )
        .unwrap_err();

        assert_eq!(failures, vec![StockFailure::insufficient("A", i32::MAX, 5)]);
    }

    #[test]
    fn aggregate_sums_without_wrapping() {
        let lines = [line("A", i32::MAX), line("B", 1), line("A", i32::MAX)];
        let totals = aggregate(&lines);
        assert_eq!(totals, vec![("A", 2 * i64::from(i32::MAX)), ("B", 1)]);
    }

    #[test]
    fn empty_cart_is_a_no_op() {
        assert_eq!(plan_deduction(&[], &[]).unwrap(), vec![]);
    }

    #[test]
    fn distinct_skus_are_sorted_and_deduplicated() {
        let skus = distinct_skus(&[line("B", 1), line("A", 1), line("B", 2)]);
        assert_eq!(skus, vec!["A".to_string(), "B".to_string()]);
    }
}
