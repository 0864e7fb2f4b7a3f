//! Printable budget (treatment plan) document.

use dentora_core::{Doctor, Patient};
use dentora_storage::types::BudgetWithItems;

use crate::format_money;
use crate::html::{escape, page};

/// Renders a budget and its line items as a printable HTML document.
pub fn budget_document(
    budget: &BudgetWithItems,
    patient: &Patient,
    doctor: Option<&Doctor>,
) -> String {
    let b = &budget.budget;
    let mut body = String::new();

    body.push_str(&format!("<h1>Budget: {}</h1>\n", escape(&b.title)));
    body.push_str(&format!(
        "<p class=\"meta\">Patient: {}</p>\n",
        escape(&patient.full_name())
    ));
    if let Some(doctor) = doctor {
        body.push_str(&format!(
            "<p class=\"meta\">Doctor: {}</p>\n",
            escape(&doctor.full_name)
        ));
    }
    body.push_str(&format!(
        "<p class=\"meta\">Status: {} &middot; Created: {}</p>\n",
        b.status,
        b.created_at.date()
    ));

    body.push_str(
        "<table>\n<thead><tr>\
         <th>Treatment</th><th class=\"num\">Qty</th>\
         <th class=\"num\">Unit price</th><th class=\"num\">Total</th>\
         </tr></thead>\n<tbody>\n",
    );
    for item in &budget.items {
        body.push_str(&format!(
            "<tr><td>{}</td><td class=\"num\">{}</td>\
             <td class=\"num\">{}</td><td class=\"num\">{}</td></tr>\n",
            escape(&item.description),
            item.quantity,
            format_money(item.unit_price_cents),
            format_money(item.line_total_cents),
        ));
    }
    body.push_str(&format!(
        "</tbody>\n<tfoot><tr><td colspan=\"3\">Total</td>\
         <td class=\"num\">{}</td></tr></tfoot>\n</table>\n",
        format_money(b.total_cents)
    ));

    if let Some(notes) = &b.notes {
        body.push_str(&format!("<p class=\"notes\">{}</p>\n", escape(notes)));
    }

    page(&format!("Budget: {}", b.title), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentora_core::{Budget, BudgetItem, BudgetStatus};
    use time::macros::datetime;
    use uuid::Uuid;

    fn sample() -> (BudgetWithItems, Patient) {
        let budget_id = Uuid::new_v4();
        let budget = Budget {
            id: budget_id,
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            status: BudgetStatus::Draft,
            title: "Implants & crowns".to_string(),
            notes: Some("Valid for 30 days".to_string()),
            total_cents: 184_500,
            created_at: datetime!(2026-01-10 09:00:00 UTC),
            updated_at: datetime!(2026-01-10 09:00:00 UTC),
            activated_at: None,
            completed_at: None,
        };
        let items = vec![BudgetItem {
            id: Uuid::new_v4(),
            budget_id,
            service_id: None,
            description: "Implant <upper>".to_string(),
            quantity: 2,
            unit_price_cents: 90_000,
            line_total_cents: 180_000,
            position: 0,
        }];
        let patient = Patient {
            id: budget.patient_id,
            first_name: "Ana".to_string(),
            last_name: "García".to_string(),
            email: None,
            phone: None,
            birth_date: None,
            doctor_id: None,
            notes: None,
            created_at: datetime!(2026-01-01 00:00:00 UTC),
            updated_at: datetime!(2026-01-01 00:00:00 UTC),
        };
        (BudgetWithItems { budget, items }, patient)
    }

    #[test]
    fn test_document_contains_rows_and_totals() {
        let (budget, patient) = sample();
        let doc = budget_document(&budget, &patient, None);
        assert!(doc.contains("Implants &amp; crowns"));
        assert!(doc.contains("Ana García"));
        assert!(doc.contains("900.00"));
        assert!(doc.contains("1845.00"));
        assert!(doc.contains("Valid for 30 days"));
    }

    #[test]
    fn test_item_description_is_escaped() {
        let (budget, patient) = sample();
        let doc = budget_document(&budget, &patient, None);
        assert!(doc.contains("Implant &lt;upper&gt;"));
        assert!(!doc.contains("Implant <upper>"));
    }
}
