use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::taxonomy::TaxonomyBlock;

/// One independently exportable / importable unit of related tables.
///
/// Declaration order is the run order: products, taxonomies, users, orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableGroup {
    Products,
    Taxonomies,
    Users,
    Orders,
}

impl TableGroup {
    pub const ALL: [TableGroup; 4] = [
        TableGroup::Products,
        TableGroup::Taxonomies,
        TableGroup::Users,
        TableGroup::Orders,
    ];

    /// Sub-directory name under the run root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            TableGroup::Products => "products",
            TableGroup::Taxonomies => "taxonomies",
            TableGroup::Users => "users",
            TableGroup::Orders => "orders",
        }
    }

    /// Human label used in file headers and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            TableGroup::Products => "Products",
            TableGroup::Taxonomies => "Taxonomies",
            TableGroup::Users => "Users",
            TableGroup::Orders => "Orders",
        }
    }

    /// Best-effort match of an uploaded file name to this group.
    ///
    /// Case-insensitive substring check; taxonomies only need `tax` so that
    /// `taxonomy.sql` and `taxonomies_part_2.sql` both match. Not unique: a
    /// name such as `products_and_orders.sql` matches two groups.
    pub fn matches_file_name(&self, name: &str) -> bool {
        let needle = match self {
            TableGroup::Taxonomies => "tax",
            other => other.dir_name(),
        };
        name.to_ascii_lowercase().contains(needle)
    }
}

impl fmt::Display for TableGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One selection flag, as accepted by `--only` and the `[export]` / `[import]`
/// config sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SelectionFlag {
    Products,
    Categories,
    Tags,
    Attributes,
    Users,
    Customers,
    Orders,
    Attachments,
}

impl FromStr for SelectionFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "products" => Ok(SelectionFlag::Products),
            "categories" => Ok(SelectionFlag::Categories),
            "tags" => Ok(SelectionFlag::Tags),
            "attributes" => Ok(SelectionFlag::Attributes),
            "users" => Ok(SelectionFlag::Users),
            "customers" => Ok(SelectionFlag::Customers),
            "orders" => Ok(SelectionFlag::Orders),
            "attachments" => Ok(SelectionFlag::Attachments),
            other => Err(format!("unknown selection flag '{}'", other)),
        }
    }
}

/// Which parts of the source the run covers.
///
/// The same flag set drives export and import: categories/tags/attributes
/// select taxonomy blocks, users/customers both select the users group
/// (with `customers` alone narrowing the export to customer accounts).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub products: bool,
    pub categories: bool,
    pub tags: bool,
    pub attributes: bool,
    pub users: bool,
    pub customers: bool,
    pub orders: bool,
    /// Export media attachments and their meta alongside products.
    pub attachments: bool,
}

impl Selection {
    pub fn from_flags<I: IntoIterator<Item = SelectionFlag>>(flags: I) -> Self {
        let mut s = Selection::default();
        for flag in flags {
            match flag {
                SelectionFlag::Products => s.products = true,
                SelectionFlag::Categories => s.categories = true,
                SelectionFlag::Tags => s.tags = true,
                SelectionFlag::Attributes => s.attributes = true,
                SelectionFlag::Users => s.users = true,
                SelectionFlag::Customers => s.customers = true,
                SelectionFlag::Orders => s.orders = true,
                SelectionFlag::Attachments => s.attachments = true,
            }
        }
        s
    }

    /// Selected taxonomy blocks, in block order.
    pub fn taxonomy_blocks(&self) -> BTreeSet<TaxonomyBlock> {
        let mut blocks = BTreeSet::new();
        if self.categories {
            blocks.insert(TaxonomyBlock::ProductCategories);
        }
        if self.tags {
            blocks.insert(TaxonomyBlock::ProductTags);
        }
        if self.attributes {
            blocks.insert(TaxonomyBlock::ProductAttributes);
        }
        blocks
    }

    /// Only customer accounts are wanted (`customers` without `users`).
    pub fn customers_only(&self) -> bool {
        self.customers && !self.users
    }

    /// Groups touched by this selection, in run order.
    pub fn groups(&self) -> Vec<TableGroup> {
        TableGroup::ALL
            .into_iter()
            .filter(|g| match g {
                TableGroup::Products => self.products || self.attachments,
                TableGroup::Taxonomies => !self.taxonomy_blocks().is_empty(),
                TableGroup::Users => self.users || self.customers,
                TableGroup::Orders => self.orders,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }
}
