//! Printable prescription document.

use dentora_core::{Doctor, Patient};
use dentora_storage::types::PrescriptionWithItems;

use crate::html::{escape, page};

/// Renders a prescription and its medication lines as printable HTML.
pub fn prescription_document(
    prescription: &PrescriptionWithItems,
    patient: &Patient,
    doctor: Option<&Doctor>,
) -> String {
    let p = &prescription.prescription;
    let mut body = String::new();

    body.push_str("<h1>Prescription</h1>\n");
    body.push_str(&format!(
        "<p class=\"meta\">Patient: {}</p>\n",
        escape(&patient.full_name())
    ));
    if let Some(doctor) = doctor {
        body.push_str(&format!(
            "<p class=\"meta\">Prescribed by: {}</p>\n",
            escape(&doctor.full_name)
        ));
    }
    body.push_str(&format!(
        "<p class=\"meta\">Issued: {}</p>\n",
        p.issued_at.date()
    ));

    body.push_str(
        "<table>\n<thead><tr>\
         <th>Medication</th><th>Dosage</th><th>Frequency</th>\
         <th>Duration</th><th>Instructions</th>\
         </tr></thead>\n<tbody>\n",
    );
    for item in &prescription.items {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&item.drug),
            escape(&item.dosage),
            escape(item.frequency.as_deref().unwrap_or("-")),
            escape(item.duration.as_deref().unwrap_or("-")),
            escape(item.instructions.as_deref().unwrap_or("-")),
        ));
    }
    body.push_str("</tbody>\n</table>\n");

    if let Some(notes) = &p.notes {
        body.push_str(&format!("<p class=\"notes\">{}</p>\n", escape(notes)));
    }

    page("Prescription", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dentora_core::{Prescription, PrescriptionItem};
    use time::macros::datetime;
    use uuid::Uuid;

    #[test]
    fn test_document_lists_medications() {
        let prescription_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        let prescription = PrescriptionWithItems {
            prescription: Prescription {
                id: prescription_id,
                patient_id,
                doctor_id: Uuid::new_v4(),
                issued_at: datetime!(2026-02-20 10:00:00 UTC),
                notes: None,
                created_at: datetime!(2026-02-20 10:00:00 UTC),
            },
            items: vec![PrescriptionItem {
                id: Uuid::new_v4(),
                prescription_id,
                drug: "Amoxicillin 500mg".to_string(),
                dosage: "1 capsule".to_string(),
                frequency: Some("every 8 hours".to_string()),
                duration: Some("7 days".to_string()),
                instructions: None,
                position: 0,
            }],
        };
        let patient = Patient {
            id: patient_id,
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

        let doc = prescription_document(&prescription, &patient, None);
        assert!(doc.contains("Amoxicillin 500mg"));
        assert!(doc.contains("every 8 hours"));
        assert!(doc.contains("2026-02-20"));
        // Missing optional fields render as a dash
        assert!(doc.contains("<td>-</td>"));
    }
}
