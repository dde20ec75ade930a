use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::new_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeConfig {
    #[serde(default)]
    pub inscription: i64,
    #[serde(default)]
    pub mensualite: i64,
}

/// An extra fee or a service: both are named amounts scoped to a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Inscription,
    Mensualite,
    Frais,
    Service,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Inscription => "inscription",
            PaymentType::Mensualite => "mensualite",
            PaymentType::Frais => "frais",
            PaymentType::Service => "service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inscription" => Some(PaymentType::Inscription),
            "mensualite" => Some(PaymentType::Mensualite),
            "frais" => Some(PaymentType::Frais),
            "service" => Some(PaymentType::Service),
            _ => None,
        }
    }

    /// Monthly types need a month; item types need an item id.
    pub fn needs_month(self) -> bool {
        matches!(self, PaymentType::Mensualite | PaymentType::Service)
    }

    pub fn needs_item(self) -> bool {
        matches!(self, PaymentType::Frais | PaymentType::Service)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub date: String,
}

/// Selects the payments counted against one due amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFilter<'a> {
    pub student_id: &'a str,
    pub kind: PaymentType,
    pub class_id: Option<&'a str>,
    pub month: Option<&'a str>,
    pub item_id: Option<&'a str>,
}

pub fn fees_map(conn: &Connection, year_id: &str) -> anyhow::Result<BTreeMap<String, FeeConfig>> {
    let mut stmt = conn.prepare(
        "SELECT class_id, inscription, mensualite FROM fees_per_class WHERE year_id = ? ORDER BY class_id",
    )?;
    let rows = stmt
        .query_map([year_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                FeeConfig {
                    inscription: r.get(1)?,
                    mensualite: r.get(2)?,
                },
            ))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn class_fees(conn: &Connection, year_id: &str, class_id: &str) -> anyhow::Result<Option<FeeConfig>> {
    let f = conn
        .query_row(
            "SELECT inscription, mensualite FROM fees_per_class WHERE year_id = ? AND class_id = ?",
            (year_id, class_id),
            |r| {
                Ok(FeeConfig {
                    inscription: r.get(0)?,
                    mensualite: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(f)
}

pub fn set_class_fees(
    conn: &Connection,
    year_id: &str,
    class_id: &str,
    fees: FeeConfig,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO fees_per_class(year_id, class_id, inscription, mensualite)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(year_id, class_id) DO UPDATE SET
           inscription = excluded.inscription,
           mensualite = excluded.mensualite",
        (year_id, class_id, fees.inscription, fees.mensualite),
    )?;
    Ok(())
}

/// Catalog tables sharing the (id, year_id, name, amount) shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    ExtraFees,
    Services,
}

impl Catalog {
    fn table(self) -> &'static str {
        match self {
            Catalog::ExtraFees => "extra_fees",
            Catalog::Services => "services",
        }
    }
}

pub fn list_catalog(conn: &Connection, catalog: Catalog, year_id: &str) -> anyhow::Result<Vec<CatalogItem>> {
    let sql = format!(
        "SELECT id, name, amount FROM {} WHERE year_id = ? ORDER BY name, id",
        catalog.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([year_id], |r| {
            Ok(CatalogItem {
                id: r.get(0)?,
                name: r.get(1)?,
                amount: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_catalog_item(
    conn: &Connection,
    catalog: Catalog,
    year_id: &str,
    id: &str,
) -> anyhow::Result<Option<CatalogItem>> {
    let sql = format!(
        "SELECT id, name, amount FROM {} WHERE year_id = ? AND id = ?",
        catalog.table()
    );
    let item = conn
        .query_row(&sql, (year_id, id), |r| {
            Ok(CatalogItem {
                id: r.get(0)?,
                name: r.get(1)?,
                amount: r.get(2)?,
            })
        })
        .optional()?;
    Ok(item)
}

/// Replaces a year's extra fees or services. Items without an id get one.
pub fn save_catalog(
    conn: &Connection,
    catalog: Catalog,
    year_id: &str,
    items: &[CatalogItem],
) -> anyhow::Result<Vec<CatalogItem>> {
    let table = catalog.table();
    let tx = conn.unchecked_transaction()?;
    tx.execute(&format!("DELETE FROM {} WHERE year_id = ?", table), [year_id])
        .with_context(|| format!("failed to delete from {}", table))?;
    let mut saved = Vec::with_capacity(items.len());
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR REPLACE INTO {}(id, year_id, name, amount) VALUES(?, ?, ?, ?)",
            table
        ))?;
        for item in items {
            let id = if item.id.trim().is_empty() {
                new_id()
            } else {
                item.id.clone()
            };
            stmt.execute((&id, year_id, item.name.trim(), item.amount))
                .with_context(|| format!("failed to insert {}", table))?;
            saved.push(CatalogItem {
                id,
                name: item.name.trim().to_string(),
                amount: item.amount,
            });
        }
    }
    tx.commit()?;
    Ok(saved)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeActivation {
    pub student_id: String,
    pub extra_fee_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceActivation {
    pub student_id: String,
    pub service_id: String,
    pub month: String,
}

pub fn list_fee_activations(conn: &Connection, year_id: &str) -> anyhow::Result<Vec<FeeActivation>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, extra_fee_id FROM student_fee_activations
         WHERE year_id = ? ORDER BY student_id, extra_fee_id",
    )?;
    let rows = stmt
        .query_map([year_id], |r| {
            Ok(FeeActivation {
                student_id: r.get(0)?,
                extra_fee_id: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_service_activations(
    conn: &Connection,
    year_id: &str,
) -> anyhow::Result<Vec<ServiceActivation>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, service_id, month FROM student_service_activations
         WHERE year_id = ? ORDER BY student_id, service_id, month",
    )?;
    let rows = stmt
        .query_map([year_id], |r| {
            Ok(ServiceActivation {
                student_id: r.get(0)?,
                service_id: r.get(1)?,
                month: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_fee_active(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    extra_fee_id: &str,
    active: bool,
) -> anyhow::Result<()> {
    if active {
        conn.execute(
            "INSERT OR IGNORE INTO student_fee_activations(student_id, year_id, extra_fee_id)
             VALUES(?, ?, ?)",
            (student_id, year_id, extra_fee_id),
        )?;
    } else {
        conn.execute(
            "DELETE FROM student_fee_activations
             WHERE student_id = ? AND year_id = ? AND extra_fee_id = ?",
            (student_id, year_id, extra_fee_id),
        )?;
    }
    Ok(())
}

pub fn set_service_active(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    service_id: &str,
    month: &str,
    active: bool,
) -> anyhow::Result<()> {
    if active {
        conn.execute(
            "INSERT OR IGNORE INTO student_service_activations(student_id, year_id, service_id, month)
             VALUES(?, ?, ?, ?)",
            (student_id, year_id, service_id, month),
        )?;
    } else {
        conn.execute(
            "DELETE FROM student_service_activations
             WHERE student_id = ? AND year_id = ? AND service_id = ? AND month = ?",
            (student_id, year_id, service_id, month),
        )?;
    }
    Ok(())
}

/// Applies one fee activation flag to many students in a single transaction.
pub fn bulk_set_fee_active(
    conn: &Connection,
    year_id: &str,
    student_ids: &[String],
    extra_fee_id: &str,
    active: bool,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for student_id in student_ids {
        set_fee_active(&tx, year_id, student_id, extra_fee_id, active)?;
    }
    tx.commit()?;
    Ok(student_ids.len())
}

pub fn bulk_set_service_active(
    conn: &Connection,
    year_id: &str,
    student_ids: &[String],
    service_id: &str,
    month: &str,
    active: bool,
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    for student_id in student_ids {
        set_service_active(&tx, year_id, student_id, service_id, month, active)?;
    }
    tx.commit()?;
    Ok(student_ids.len())
}

pub fn is_fee_active(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    extra_fee_id: &str,
) -> anyhow::Result<bool> {
    super::row_exists(
        conn,
        "SELECT 1 FROM student_fee_activations WHERE student_id = ? AND year_id = ? AND extra_fee_id = ?",
        (student_id, year_id, extra_fee_id),
    )
}

pub fn is_service_active(
    conn: &Connection,
    year_id: &str,
    student_id: &str,
    service_id: &str,
    month: &str,
) -> anyhow::Result<bool> {
    super::row_exists(
        conn,
        "SELECT 1 FROM student_service_activations
         WHERE student_id = ? AND year_id = ? AND service_id = ? AND month = ?",
        (student_id, year_id, service_id, month),
    )
}

const PAYMENT_SELECT: &str =
    "SELECT id, student_id, type, class_id, month, item_id, method, amount, date FROM payments";

fn row_to_payment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    let kind: String = r.get(2)?;
    let kind = PaymentType::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown payment type {:?}", kind).into(),
        )
    })?;
    Ok(Payment {
        id: r.get(0)?,
        student_id: r.get(1)?,
        kind,
        class_id: r.get(3)?,
        month: r.get(4)?,
        item_id: r.get(5)?,
        method: r.get(6)?,
        amount: r.get(7)?,
        date: r.get(8)?,
    })
}

/// Most recent first.
pub fn list_payments(
    conn: &Connection,
    year_id: &str,
    student_id: Option<&str>,
) -> anyhow::Result<Vec<Payment>> {
    let sql = format!(
        "{} WHERE year_id = ?1 AND (?2 IS NULL OR student_id = ?2) ORDER BY date DESC, id",
        PAYMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((year_id, student_id), row_to_payment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn add_payment(conn: &Connection, year_id: &str, payment: &Payment) -> anyhow::Result<Payment> {
    let mut p = payment.clone();
    if p.id.trim().is_empty() {
        p.id = new_id();
    }
    conn.execute(
        "INSERT INTO payments(id, year_id, student_id, type, class_id, month, item_id, method, amount, date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &p.id,
            year_id,
            &p.student_id,
            p.kind.as_str(),
            &p.class_id,
            &p.month,
            &p.item_id,
            &p.method,
            p.amount,
            &p.date,
        ),
    )?;
    Ok(p)
}

/// Payments counted against one due amount, oldest first.
pub fn payments_matching(
    conn: &Connection,
    year_id: &str,
    filter: &PaymentFilter<'_>,
) -> anyhow::Result<Vec<Payment>> {
    let sql = format!(
        "{} WHERE year_id = ?1 AND student_id = ?2 AND type = ?3
           AND (?4 IS NULL OR class_id = ?4)
           AND (?5 IS NULL OR month = ?5)
           AND (?6 IS NULL OR item_id = ?6)
         ORDER BY date, id",
        PAYMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                year_id,
                filter.student_id,
                filter.kind.as_str(),
                filter.class_id,
                filter.month,
                filter.item_id,
            ),
            row_to_payment,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Configured price for one payment line. `None` when the class has no fee
/// row or the item does not exist in the year.
pub fn due_amount(
    conn: &Connection,
    year_id: &str,
    kind: PaymentType,
    class_id: Option<&str>,
    item_id: Option<&str>,
) -> anyhow::Result<Option<i64>> {
    match kind {
        PaymentType::Inscription | PaymentType::Mensualite => {
            let Some(class_id) = class_id else {
                return Ok(None);
            };
            let fees = class_fees(conn, year_id, class_id)?;
            Ok(fees.map(|f| match kind {
                PaymentType::Inscription => f.inscription,
                _ => f.mensualite,
            }))
        }
        PaymentType::Frais | PaymentType::Service => {
            let Some(item_id) = item_id else {
                return Ok(None);
            };
            let catalog = if kind == PaymentType::Frais {
                Catalog::ExtraFees
            } else {
                Catalog::Services
            };
            let item = get_catalog_item(conn, catalog, year_id, item_id)?;
            Ok(item.map(|i| i.amount))
        }
    }
}

pub fn total_collected(conn: &Connection, year_id: &str) -> anyhow::Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE year_id = ?",
        [year_id],
        |r| r.get(0),
    )?;
    Ok(total)
}
