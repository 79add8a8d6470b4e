use crate::browser::{BrowserPage, BrowserResult, PageElement};
use crate::config::{FormSignatureSection, FormsSection, IdentityField};
use crate::registry::PlatformCategory;
use crate::session::PosterIdentity;

/// Ordered candidate selectors describing one category's submission form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSignature {
    pub category: PlatformCategory,
    pub content: Vec<String>,
    pub name: Vec<String>,
    pub email: Vec<String>,
    pub website: Vec<String>,
    pub submit: Vec<String>,
    pub required: Vec<IdentityField>,
}

impl FormSignature {
    pub fn from_section(category: PlatformCategory, section: &FormSignatureSection) -> Self {
        Self {
            category,
            content: section.content.clone(),
            name: section.name.clone(),
            email: section.email.clone(),
            website: section.website.clone(),
            submit: section.submit.clone(),
            required: section.required.clone(),
        }
    }

    pub fn for_category(category: PlatformCategory, forms: &FormsSection) -> Self {
        Self::from_section(category, forms.for_category(category))
    }

    pub fn identity_selectors(&self, field: IdentityField) -> &[String] {
        match field {
            IdentityField::Name => &self.name,
            IdentityField::Email => &self.email,
            IdentityField::Website => &self.website,
        }
    }

    pub fn is_required(&self, field: IdentityField) -> bool {
        self.required.contains(&field)
    }

    /// Finds the content field and submit control. Identity fields are
    /// optional on the page; absent ones are left out.
    pub async fn locate(&self, page: &dyn BrowserPage) -> BrowserResult<Option<LocatedForm>> {
        let Some(content) = first_present(page, &self.content).await? else {
            return Ok(None);
        };
        let Some(submit) = first_present(page, &self.submit).await? else {
            return Ok(None);
        };
        let mut identity = Vec::new();
        for field in IDENTITY_FIELDS {
            if let Some(element) = first_present(page, self.identity_selectors(field)).await? {
                identity.push((field, element));
            }
        }
        Ok(Some(LocatedForm {
            content,
            submit,
            identity,
        }))
    }
}

pub const IDENTITY_FIELDS: [IdentityField; 3] = [
    IdentityField::Name,
    IdentityField::Email,
    IdentityField::Website,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedForm {
    pub content: PageElement,
    pub submit: PageElement,
    pub identity: Vec<(IdentityField, PageElement)>,
}

pub fn identity_value(identity: &PosterIdentity, field: IdentityField) -> Option<&str> {
    let value = match field {
        IdentityField::Name => identity.name.as_deref(),
        IdentityField::Email => identity.email.as_deref(),
        IdentityField::Website => identity.website.as_deref(),
    };
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn field_name(field: IdentityField) -> &'static str {
    match field {
        IdentityField::Name => "name",
        IdentityField::Email => "email",
        IdentityField::Website => "website",
    }
}

async fn first_present(
    page: &dyn BrowserPage,
    selectors: &[String],
) -> BrowserResult<Option<PageElement>> {
    for selector in selectors {
        if let Some(element) = page.find(selector).await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}
