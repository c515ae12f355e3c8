use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entity::products,
    error::{AppError, AppResult},
};

/// Read-side product snapshot used for order validation and pricing. The
/// core never mutates catalog state; prices are frozen onto order items at
/// creation time.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub base_price_minor: i64,
    pub available: bool,
    pub variants: Vec<VariantSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantSnapshot {
    pub label: String,
    #[serde(default)]
    pub price_modifier_minor: i64,
}

impl ProductSnapshot {
    /// Unit price for the requested variant. An unknown label is a
    /// validation failure; `None` means the base product.
    pub fn unit_price_minor(&self, variant_label: Option<&str>) -> AppResult<i64> {
        match variant_label {
            None => Ok(self.base_price_minor),
            Some(label) => {
                let variant = self
                    .variants
                    .iter()
                    .find(|v| v.label == label)
                    .ok_or_else(|| {
                        AppError::ValidationFailed(format!("unknown variant '{label}'"))
                    })?;
                Ok(self.base_price_minor + variant.price_modifier_minor)
            }
        }
    }
}

/// Load a product snapshot scoped to a restaurant. Returns `None` when the
/// product does not exist or is attached to a different restaurant.
pub async fn load_product<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    product_id: Uuid,
) -> AppResult<Option<ProductSnapshot>> {
    let Some(row) = products::Entity::find_by_id(product_id)
        .filter(products::Column::RestaurantId.eq(restaurant_id))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let variants: Vec<VariantSnapshot> = match row.variants {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed variants: {e}")))?,
        None => Vec::new(),
    };

    Ok(Some(ProductSnapshot {
        id: row.id,
        name: row.name,
        base_price_minor: row.base_price_minor,
        available: row.available,
        variants,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Ramen".into(),
            base_price_minor: 950,
            available: true,
            variants: vec![
                VariantSnapshot {
                    label: "large".into(),
                    price_modifier_minor: 200,
                },
                VariantSnapshot {
                    label: "small".into(),
                    price_modifier_minor: -150,
                },
            ],
        }
    }

    #[test]
    fn base_price_without_variant() {
        assert_eq!(snapshot().unit_price_minor(None).unwrap(), 950);
    }

    #[test]
    fn variant_modifier_is_applied() {
        assert_eq!(snapshot().unit_price_minor(Some("large")).unwrap(), 1150);
        assert_eq!(snapshot().unit_price_minor(Some("small")).unwrap(), 800);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        assert!(matches!(
            snapshot().unit_price_minor(Some("mega")),
            Err(AppError::ValidationFailed(_))
        ));
    }
}
