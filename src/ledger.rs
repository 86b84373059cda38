//! Application state for salonbook.
//!
//! The [`Ledger`] owns the three in-memory record collections (customers,
//! treatments, gallery) together with the key-value store they are mirrored
//! to. All CRUD goes through it, and every mutation is immediately followed
//! by a full re-serialization of the mutated collection, so the persisted
//! stores never lag the live state.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::model::{
    Customer, DesignColor, GalleryImage, IdGenerator, NewCustomer, NewTreatment, Season, Treatment,
};

/// Store key for the serialized customer collection.
pub const STORE_CUSTOMERS: &str = "salon_customers";
/// Store key for the serialized treatment collection.
pub const STORE_TREATMENTS: &str = "salon_treatments";
/// Store key for the serialized gallery collection.
pub const STORE_DESIGNS: &str = "salon_designs";

/// Sort order for customer listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerSort {
    /// By name, ascending.
    #[default]
    Name,
    /// By most recent visit, newest first. Customers without visits sort last.
    LastVisit,
    /// By derived visit count, descending.
    Visits,
}

/// Live counts across the collections, recorded in snapshot bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    /// Number of customer records.
    pub customer_count: usize,
    /// Number of treatment records.
    pub treatment_count: usize,
    /// Number of gallery images.
    pub gallery_count: usize,
}

/// The application-state controller.
#[derive(Debug)]
pub struct Ledger {
    kv: KvStore,
    ids: IdGenerator,
    customers: Vec<Customer>,
    treatments: Vec<Treatment>,
    gallery: Vec<GalleryImage>,
}

impl Ledger {
    /// Load the ledger from the given store.
    ///
    /// Absent store keys yield empty collections.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails or a persisted collection
    /// cannot be parsed.
    pub fn load(kv: KvStore) -> Result<Self> {
        let mut ledger = Self {
            kv,
            ids: IdGenerator::new(),
            customers: Vec::new(),
            treatments: Vec::new(),
            gallery: Vec::new(),
        };
        ledger.reload()?;
        Ok(ledger)
    }

    /// Re-read all three collections from the persisted stores, replacing
    /// the in-memory state. Required after a snapshot restore.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails or a persisted collection
    /// cannot be parsed.
    pub fn reload(&mut self) -> Result<()> {
        self.customers = Self::load_collection(&self.kv, STORE_CUSTOMERS)?;
        self.treatments = Self::load_collection(&self.kv, STORE_TREATMENTS)?;
        self.gallery = Self::load_collection(&self.kv, STORE_DESIGNS)?;
        debug!(
            "Loaded {} customers, {} treatments, {} gallery images",
            self.customers.len(),
            self.treatments.len(),
            self.gallery.len()
        );
        Ok(())
    }

    fn load_collection<T: serde::de::DeserializeOwned>(kv: &KvStore, key: &str) -> Result<Vec<T>> {
        match kv.get(key)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// Access the underlying key-value store.
    #[must_use]
    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    /// The customer collection, in insertion order.
    #[must_use]
    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    /// The treatment collection, in insertion order.
    #[must_use]
    pub fn treatments(&self) -> &[Treatment] {
        &self.treatments
    }

    /// The gallery collection, in insertion order.
    #[must_use]
    pub fn gallery(&self) -> &[GalleryImage] {
        &self.gallery
    }

    /// Live counts for snapshot stats.
    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            customer_count: self.customers.len(),
            treatment_count: self.treatments.len(),
            gallery_count: self.gallery.len(),
        }
    }

    // === Customers ===

    /// Look up a customer by id.
    #[must_use]
    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    /// Register a new customer.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name is blank, and a store error
    /// (leaving the in-memory collection unchanged) when persisting fails.
    pub fn add_customer(&mut self, form: NewCustomer) -> Result<&Customer> {
        if form.name.trim().is_empty() {
            return Err(Error::validation("customer name is required"));
        }

        let customer = Customer::from_form(self.ids.next_id(), form);
        self.customers.push(customer);

        if let Err(err) = self.save_customers() {
            // Roll back so live state keeps matching the persisted store
            self.customers.pop();
            return Err(err);
        }

        Ok(self.customers.last().expect("just pushed"))
    }

    /// Edit a customer by delete-and-recreate.
    ///
    /// The replacement gets a fresh id and creation timestamp. Treatments
    /// keep referencing the old id; the foreign key is deliberately not
    /// enforced, matching how records behave elsewhere in the system.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer does not exist, the replacement is
    /// invalid, or persisting fails (the original record is kept in that
    /// case).
    pub fn edit_customer(&mut self, id: &str, form: NewCustomer) -> Result<&Customer> {
        if form.name.trim().is_empty() {
            return Err(Error::validation("customer name is required"));
        }

        let index = self
            .customers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::record_missing("customer", id))?;

        let previous = self.customers.remove(index);
        let replacement = Customer::from_form(self.ids.next_id(), form);
        self.customers.push(replacement);

        if let Err(err) = self.save_customers() {
            self.customers.pop();
            self.customers.insert(index, previous);
            return Err(err);
        }

        Ok(self.customers.last().expect("just pushed"))
    }

    /// Delete a customer, cascading deletion of their treatments.
    ///
    /// Returns the number of cascaded treatment deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer does not exist or persisting fails.
    pub fn delete_customer(&mut self, id: &str) -> Result<usize> {
        if self.customer(id).is_none() {
            return Err(Error::record_missing("customer", id));
        }

        self.customers.retain(|c| c.id != id);
        let before = self.treatments.len();
        self.treatments.retain(|t| t.customer_id != id);
        let cascaded = before - self.treatments.len();

        self.save_customers()?;
        self.save_treatments()?;

        debug!("Deleted customer {id} and {cascaded} treatments");
        Ok(cascaded)
    }

    /// Customers matching a search string against name, kana, or phone.
    #[must_use]
    pub fn search_customers(&self, query: &str) -> Vec<&Customer> {
        let needle = query.to_lowercase();
        self.customers
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&needle)
                    || c.kana.to_lowercase().contains(&needle)
                    || c.phone.contains(&needle)
            })
            .collect()
    }

    /// Customers in the given sort order.
    #[must_use]
    pub fn sorted_customers(&self, sort: CustomerSort) -> Vec<&Customer> {
        let mut sorted: Vec<&Customer> = self.customers.iter().collect();
        match sort {
            CustomerSort::Name => sorted.sort_by(|a, b| a.name.cmp(&b.name)),
            CustomerSort::LastVisit => sorted.sort_by(|a, b| {
                let last_a = self.last_visit(&a.id);
                let last_b = self.last_visit(&b.id);
                // Newest first; customers without visits sink to the end
                last_b.cmp(&last_a)
            }),
            CustomerSort::Visits => {
                sorted.sort_by_key(|c| std::cmp::Reverse(self.visit_count(&c.id)));
            }
        }
        sorted
    }

    /// Date of the customer's most recent treatment, if any.
    #[must_use]
    pub fn last_visit(&self, customer_id: &str) -> Option<NaiveDate> {
        self.treatments
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .map(|t| t.date)
            .max()
    }

    /// Number of treatments recorded for the customer.
    #[must_use]
    pub fn visit_count(&self, customer_id: &str) -> usize {
        self.treatments
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .count()
    }

    // === Treatments ===

    /// Record a new treatment. Each attached photo also produces a gallery
    /// image classified from the treatment's tags.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a required field (customer, date,
    /// menu, price) is missing, and a store error (in-memory state rolled
    /// back) when persisting fails.
    pub fn add_treatment(&mut self, form: NewTreatment) -> Result<&Treatment> {
        if form.customer_id.trim().is_empty() {
            return Err(Error::validation("treatment customer is required"));
        }
        let date = form
            .date
            .ok_or_else(|| Error::validation("treatment date is required"))?;
        if form.menu.trim().is_empty() {
            return Err(Error::validation("treatment menu is required"));
        }
        let price = form
            .price
            .ok_or_else(|| Error::validation("treatment price is required"))?;

        if self.customer(&form.customer_id).is_none() {
            // The customer reference is not enforced, but flag it
            warn!("treatment references unknown customer {}", form.customer_id);
        }

        let treatment = Treatment {
            id: self.ids.next_id(),
            customer_id: form.customer_id,
            date,
            menu: form.menu,
            color: form.color,
            parts: form.parts,
            shape: form.shape,
            length: form.length,
            duration_minutes: form.duration_minutes,
            price,
            staff: form.staff,
            tags: form.tags,
            next_proposal: form.next_proposal,
            photos: form.photos,
            created_at: chrono::Utc::now(),
        };

        let images: Vec<GalleryImage> = treatment
            .photos
            .iter()
            .map(|photo| {
                GalleryImage::from_treatment_photo(self.ids.next_id(), photo.clone(), &treatment)
            })
            .collect();

        let gallery_added = images.len();
        self.treatments.push(treatment);
        self.gallery.extend(images);

        let saved = self.save_treatments().and_then(|()| self.save_designs());
        if let Err(err) = saved {
            self.treatments.pop();
            self.gallery.truncate(self.gallery.len() - gallery_added);
            return Err(err);
        }

        Ok(self.treatments.last().expect("just pushed"))
    }

    /// Treatments for one customer, in insertion order.
    #[must_use]
    pub fn treatments_for(&self, customer_id: &str) -> Vec<&Treatment> {
        self.treatments
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .collect()
    }

    /// All treatments, newest visit date first.
    #[must_use]
    pub fn treatments_by_date(&self) -> Vec<&Treatment> {
        let mut sorted: Vec<&Treatment> = self.treatments.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted
    }

    // === Gallery ===

    /// Gallery images matching the given filters. `text` matches any tag,
    /// case-insensitively.
    #[must_use]
    pub fn filter_gallery(
        &self,
        text: Option<&str>,
        season: Option<Season>,
        color: Option<DesignColor>,
    ) -> Vec<&GalleryImage> {
        let needle = text.map(str::to_lowercase);
        self.gallery
            .iter()
            .filter(|g| {
                let text_ok = needle.as_ref().map_or(true, |n| {
                    g.tags.iter().any(|tag| tag.to_lowercase().contains(n))
                });
                let season_ok = season.is_none() || g.season == season;
                let color_ok = color.is_none() || g.color == color;
                text_ok && season_ok && color_ok
            })
            .collect()
    }

    // === Persistence ===

    fn save_customers(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.customers)?;
        self.kv.set(STORE_CUSTOMERS, &blob)
    }

    fn save_treatments(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.treatments)?;
        self.kv.set(STORE_TREATMENTS, &blob)
    }

    fn save_designs(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.gallery)?;
        self.kv.set(STORE_DESIGNS, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger() -> Ledger {
        let kv = KvStore::open_in_memory(None).expect("in-memory store");
        Ledger::load(kv).expect("empty ledger")
    }

    fn customer_form(name: &str) -> NewCustomer {
        NewCustomer {
            name: name.to_string(),
            ..NewCustomer::default()
        }
    }

    fn treatment_form(customer_id: &str) -> NewTreatment {
        NewTreatment {
            customer_id: customer_id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 12, 1),
            menu: "ジェルネイル".to_string(),
            price: Some(8000),
            ..NewTreatment::default()
        }
    }

    #[test]
    fn test_load_empty() {
        let ledger = test_ledger();
        assert!(ledger.customers().is_empty());
        assert!(ledger.treatments().is_empty());
        assert!(ledger.gallery().is_empty());
    }

    #[test]
    fn test_add_customer_persists() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        // The persisted blob reflects the mutation immediately
        let blob = ledger.kv().get(STORE_CUSTOMERS).unwrap().unwrap();
        let persisted: Vec<Customer> = serde_json::from_str(&blob).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, id);
    }

    #[test]
    fn test_add_customer_requires_name() {
        let mut ledger = test_ledger();
        let result = ledger.add_customer(customer_form("  "));
        assert!(result.is_err());
        assert!(ledger.customers().is_empty());
    }

    #[test]
    fn test_add_customer_rolls_back_on_quota_failure() {
        let kv = KvStore::open_in_memory(Some(16)).unwrap();
        let mut ledger = Ledger::load(kv).unwrap();

        let result = ledger.add_customer(customer_form("a name long enough to exceed the quota"));
        assert!(result.is_err());
        assert!(ledger.customers().is_empty());
        assert_eq!(ledger.kv().get(STORE_CUSTOMERS).unwrap(), None);
    }

    #[test]
    fn test_edit_customer_recreates() {
        let mut ledger = test_ledger();
        let old_id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        let new_id = ledger
            .edit_customer(&old_id, customer_form("田中 はな子"))
            .unwrap()
            .id
            .clone();

        assert_ne!(old_id, new_id);
        assert!(ledger.customer(&old_id).is_none());
        assert_eq!(ledger.customer(&new_id).unwrap().name, "田中 はな子");
        assert_eq!(ledger.customers().len(), 1);
    }

    #[test]
    fn test_edit_customer_missing() {
        let mut ledger = test_ledger();
        let result = ledger.edit_customer("nope", customer_form("x"));
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_customer_cascades_treatments() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();
        ledger.add_treatment(treatment_form(&id)).unwrap();
        ledger.add_treatment(treatment_form(&id)).unwrap();

        let other = ledger
            .add_customer(customer_form("佐藤 美咲"))
            .unwrap()
            .id
            .clone();
        ledger.add_treatment(treatment_form(&other)).unwrap();

        let cascaded = ledger.delete_customer(&id).unwrap();
        assert_eq!(cascaded, 2);
        assert_eq!(ledger.customers().len(), 1);
        assert_eq!(ledger.treatments().len(), 1);

        // Persisted stores match
        let blob = ledger.kv().get(STORE_TREATMENTS).unwrap().unwrap();
        let persisted: Vec<Treatment> = serde_json::from_str(&blob).unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[test]
    fn test_delete_customer_missing() {
        let mut ledger = test_ledger();
        assert!(ledger.delete_customer("nope").is_err());
    }

    #[test]
    fn test_add_treatment_requires_fields() {
        let mut ledger = test_ledger();

        let mut form = treatment_form("c1");
        form.menu = String::new();
        assert!(ledger.add_treatment(form).is_err());

        let mut form = treatment_form("c1");
        form.price = None;
        assert!(ledger.add_treatment(form).is_err());

        let mut form = treatment_form("c1");
        form.date = None;
        assert!(ledger.add_treatment(form).is_err());

        assert!(ledger.treatments().is_empty());
    }

    #[test]
    fn test_add_treatment_with_photos_feeds_gallery() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        let mut form = treatment_form(&id);
        form.tags = vec!["ピンク".to_string(), "冬".to_string()];
        form.photos = vec!["photo-a".to_string(), "photo-b".to_string()];
        ledger.add_treatment(form).unwrap();

        assert_eq!(ledger.gallery().len(), 2);
        let image = &ledger.gallery()[0];
        assert_eq!(image.customer_id, id);
        assert_eq!(image.season, Some(Season::Winter));
        assert_eq!(image.color, Some(DesignColor::Pink));

        // Gallery store persisted too
        assert!(ledger.kv().get(STORE_DESIGNS).unwrap().is_some());
    }

    #[test]
    fn test_reload_reflects_persisted_state() {
        let mut ledger = test_ledger();
        ledger.add_customer(customer_form("田中 花子")).unwrap();

        // Overwrite the persisted store behind the ledger's back
        ledger.kv().set(STORE_CUSTOMERS, "[]").unwrap();
        ledger.reload().unwrap();
        assert!(ledger.customers().is_empty());
    }

    #[test]
    fn test_last_visit_and_visit_count() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        assert!(ledger.last_visit(&id).is_none());
        assert_eq!(ledger.visit_count(&id), 0);

        let mut first = treatment_form(&id);
        first.date = NaiveDate::from_ymd_opt(2024, 11, 1);
        ledger.add_treatment(first).unwrap();
        ledger.add_treatment(treatment_form(&id)).unwrap();

        assert_eq!(ledger.visit_count(&id), 2);
        assert_eq!(ledger.last_visit(&id), NaiveDate::from_ymd_opt(2024, 12, 1));
    }

    #[test]
    fn test_search_customers() {
        let mut ledger = test_ledger();
        let mut form = customer_form("田中 花子");
        form.kana = "たなか はなこ".to_string();
        form.phone = "090-1234-5678".to_string();
        ledger.add_customer(form).unwrap();
        ledger.add_customer(customer_form("佐藤 美咲")).unwrap();

        assert_eq!(ledger.search_customers("田中").len(), 1);
        assert_eq!(ledger.search_customers("たなか").len(), 1);
        assert_eq!(ledger.search_customers("1234").len(), 1);
        assert_eq!(ledger.search_customers("いない").len(), 0);
    }

    #[test]
    fn test_sorted_customers_by_visits() {
        let mut ledger = test_ledger();
        let a = ledger
            .add_customer(customer_form("あ"))
            .unwrap()
            .id
            .clone();
        let b = ledger
            .add_customer(customer_form("い"))
            .unwrap()
            .id
            .clone();
        ledger.add_treatment(treatment_form(&b)).unwrap();
        ledger.add_treatment(treatment_form(&b)).unwrap();
        ledger.add_treatment(treatment_form(&a)).unwrap();

        let sorted = ledger.sorted_customers(CustomerSort::Visits);
        assert_eq!(sorted[0].id, b);
        assert_eq!(sorted[1].id, a);
    }

    #[test]
    fn test_sorted_customers_by_last_visit() {
        let mut ledger = test_ledger();
        let a = ledger
            .add_customer(customer_form("あ"))
            .unwrap()
            .id
            .clone();
        let b = ledger
            .add_customer(customer_form("い"))
            .unwrap()
            .id
            .clone();
        let no_visits = ledger
            .add_customer(customer_form("う"))
            .unwrap()
            .id
            .clone();

        let mut old = treatment_form(&a);
        old.date = NaiveDate::from_ymd_opt(2024, 1, 1);
        ledger.add_treatment(old).unwrap();
        ledger.add_treatment(treatment_form(&b)).unwrap();

        let sorted = ledger.sorted_customers(CustomerSort::LastVisit);
        assert_eq!(sorted[0].id, b);
        assert_eq!(sorted[1].id, a);
        assert_eq!(sorted[2].id, no_visits);
    }

    #[test]
    fn test_treatments_by_date() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        let mut old = treatment_form(&id);
        old.date = NaiveDate::from_ymd_opt(2024, 1, 1);
        ledger.add_treatment(old).unwrap();
        ledger.add_treatment(treatment_form(&id)).unwrap();

        let sorted = ledger.treatments_by_date();
        assert!(sorted[0].date > sorted[1].date);
    }

    #[test]
    fn test_filter_gallery() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();

        let mut winter = treatment_form(&id);
        winter.tags = vec!["ピンク".to_string(), "冬".to_string()];
        winter.photos = vec!["p1".to_string()];
        ledger.add_treatment(winter).unwrap();

        let mut summer = treatment_form(&id);
        summer.tags = vec!["ブルー".to_string(), "海".to_string()];
        summer.photos = vec!["p2".to_string()];
        ledger.add_treatment(summer).unwrap();

        assert_eq!(ledger.filter_gallery(None, None, None).len(), 2);
        assert_eq!(
            ledger
                .filter_gallery(None, Some(Season::Winter), None)
                .len(),
            1
        );
        assert_eq!(
            ledger
                .filter_gallery(None, None, Some(DesignColor::Blue))
                .len(),
            1
        );
        assert_eq!(ledger.filter_gallery(Some("ピンク"), None, None).len(), 1);
        assert_eq!(
            ledger
                .filter_gallery(Some("ピンク"), Some(Season::Summer), None)
                .len(),
            0
        );
    }

    #[test]
    fn test_stats() {
        let mut ledger = test_ledger();
        let id = ledger
            .add_customer(customer_form("田中 花子"))
            .unwrap()
            .id
            .clone();
        let mut form = treatment_form(&id);
        form.photos = vec!["p".to_string()];
        ledger.add_treatment(form).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.customer_count, 1);
        assert_eq!(stats.treatment_count, 1);
        assert_eq!(stats.gallery_count, 1);
    }
}
