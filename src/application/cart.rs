use crate::domain::eligibility::{EligibilityRules, TrustSnapshot, TrustTier};
use crate::domain::party::{Cart, CartLine, ProductId, UserId};
use crate::domain::ports::{CartStoreRef, CatalogReaderRef, IdentityReaderRef};
use crate::error::{MarketError, Result};

/// Pending carts, guarded by the eligibility gate.
pub struct CartService {
    identity: IdentityReaderRef,
    catalog: CatalogReaderRef,
    carts: CartStoreRef,
    rules: EligibilityRules,
}

impl CartService {
    pub fn new(
        identity: IdentityReaderRef,
        catalog: CatalogReaderRef,
        carts: CartStoreRef,
        rules: EligibilityRules,
    ) -> Self {
        Self {
            identity,
            catalog,
            carts,
            rules,
        }
    }

    pub async fn trust_snapshot(&self, buyer: &UserId) -> Result<TrustSnapshot> {
        let user = self
            .identity
            .user(buyer)
            .await?
            .ok_or_else(|| MarketError::UserNotFound(buyer.to_string()))?;
        let reviews = self.identity.reviews_received(buyer).await?;
        Ok(TrustSnapshot::from_reviews(
            user.completed_orders,
            &reviews,
            self.rules.top_rating,
        ))
    }

    /// Current trust tier of `buyer`.
    pub async fn tier(&self, buyer: &UserId) -> Result<TrustTier> {
        let trust = self.trust_snapshot(buyer).await?;
        Ok(self.rules.tier(&trust))
    }

    /// Adds a rental of `product` for `duration_days` to the buyer's cart.
    #[tracing::instrument(skip(self), fields(buyer = %buyer, product = %product))]
    pub async fn add_to_cart(
        &self,
        buyer: &UserId,
        product: &ProductId,
        duration_days: u32,
    ) -> Result<Cart> {
        if duration_days == 0 {
            return Err(MarketError::ValidationError(
                "Rental duration must be at least one day".to_string(),
            ));
        }

        let item = self
            .catalog
            .product(product)
            .await?
            .ok_or_else(|| MarketError::ProductNotFound(product.to_string()))?;
        if !item.available {
            return Err(MarketError::conflict(format!(
                "product {product} is not available"
            )));
        }
        if &item.vendor == buyer {
            return Err(MarketError::conflict("buyers cannot rent their own products"));
        }

        let trust = self.trust_snapshot(buyer).await?;
        let tier = self.rules.check(&trust, duration_days, item.price)?;

        let mut cart = self.carts.cart(buyer).await?;
        if cart.contains(product) {
            return Err(MarketError::conflict(format!(
                "product {product} is already in the cart"
            )));
        }
        cart.lines.push(CartLine {
            product: item.id,
            vendor: item.vendor,
            duration_days,
            price: item.price,
        });
        self.carts.put_cart(cart.clone()).await?;

        tracing::info!(?tier, lines = cart.lines.len(), "added to cart");
        Ok(cart)
    }

    pub async fn remove_from_cart(&self, buyer: &UserId, product: &ProductId) -> Result<Cart> {
        let mut cart = self.carts.cart(buyer).await?;
        let before = cart.lines.len();
        cart.lines.retain(|l| &l.product != product);
        if cart.lines.len() == before {
            return Err(MarketError::ProductNotFound(product.to_string()));
        }
        self.carts.put_cart(cart.clone()).await?;
        Ok(cart)
    }

    pub async fn cart(&self, buyer: &UserId) -> Result<Cart> {
        self.carts.cart(buyer).await
    }
}
