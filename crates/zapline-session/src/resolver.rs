// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant lookup from a fixed phone-to-tenant table.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use zapline_core::{TenantId, TenantResolver, ZaplineError, phone_digits};

/// Resolves business phone numbers from the `[tenants]` config table.
///
/// Numbers are compared by digits only, so `+55 11 4000-0000` and
/// `5511400000000@s.whatsapp.net` name the same tenant.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    by_phone: HashMap<String, TenantId>,
}

impl StaticTenantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(tenants: &BTreeMap<String, String>) -> Self {
        tenants
            .iter()
            .fold(Self::new(), |resolver, (phone, tenant)| {
                resolver.with_tenant(phone, TenantId::from(tenant.trim()))
            })
    }

    pub fn with_tenant(mut self, phone: &str, tenant_id: TenantId) -> Self {
        self.by_phone.insert(phone_digits(phone), tenant_id);
        self
    }

    pub fn len(&self) -> usize {
        self.by_phone.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_phone.is_empty()
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn resolve_tenant_for_sender(
        &self,
        phone_number: &str,
    ) -> Result<Option<TenantId>, ZaplineError> {
        let digits = phone_digits(phone_number);
        if digits.is_empty() {
            return Err(ZaplineError::InvalidInput(format!(
                "not a phone number: {phone_number:?}"
            )));
        }
        Ok(self.by_phone.get(&digits).cloned())
    }
}
