//! Descriptors for the entity types exposed by the remote API
//!
//! The client registry falls back to [`standard`] the first time an entity
//! name is requested. Callers can register their own descriptors to add
//! entity types or override these.

use serde_json::json;

use crate::types::{
    field_map, EntityDescriptor, FieldNormalizer, LookupKey, LookupShape, Mutability, Operation,
};

/// Remote error codes the client reacts to.
pub mod codes {
    pub const CONTACT_ALREADY_EXISTS: i64 = 303;
    pub const FIELD_ALREADY_EXISTS: i64 = 403;
    pub const MESSAGE_EXISTS: i64 = 603;
    pub const AUTOMATOR_EXISTS: i64 = 1103;
    pub const CONTENT_TAG_ALREADY_EXISTS: i64 = 1403;

    pub const CONVERSION_DUPLICATE_ORDER: i64 = 901;
    pub const CONVERSION_MISSING_AMOUNT: i64 = 902;
    pub const CONVERSION_MISSING_QUANTITY: i64 = 903;

    pub const ACTIVITY_INVALID_START_DATE: i64 = 1201;
    pub const ACTIVITY_INVALID_TYPE: i64 = 1202;
    pub const ACTIVITY_INVALID_SIZE: i64 = 1203;
    pub const ACTIVITY_NO_CONTACT_FILTER: i64 = 1204;
}

/// API token permission bits.
pub mod permissions {
    pub const NONE: u8 = 0;
    pub const READ: u8 = 1;
    pub const WRITE: u8 = 2;
    pub const SEND: u8 = 4;
    pub const READ_WRITE: u8 = READ | WRITE;
    pub const READ_SEND: u8 = READ | SEND;
    pub const WRITE_SEND: u8 = WRITE | SEND;
    pub const ALL: u8 = READ | WRITE | SEND;

    /// Labels for a permission mask, in `read`, `write`, `send` order.
    pub fn labels(mask: u8) -> Vec<&'static str> {
        [(READ, "read"), (WRITE, "write"), (SEND, "send")]
            .into_iter()
            .filter(|(bit, _)| mask & bit != 0)
            .map(|(_, label)| label)
            .collect()
    }
}

/// Tracking types reported by activities.
pub const TRACKING_TYPES: [&str; 7] =
    ["open", "click", "conversion", "bounce", "send", "unsubscribe", "view"];

/// Names of every entity with a built-in descriptor.
pub const STANDARD_ENTITIES: [&str; 15] = [
    "Account",
    "Activity",
    "ApiToken",
    "Contact",
    "ContentTag",
    "Conversion",
    "Delivery",
    "DeliveryGroup",
    "Field",
    "Login",
    "MailList",
    "Message",
    "MessageRule",
    "Order",
    "Segment",
];

const CRUD: [Operation; 4] = [Operation::Add, Operation::Read, Operation::Update, Operation::Delete];

/// Built-in descriptor for `name` (case-insensitive).
pub fn standard(name: &str) -> Option<EntityDescriptor> {
    let canonical = STANDARD_ENTITIES.iter().find(|known| known.eq_ignore_ascii_case(name))?;
    let descriptor = match *canonical {
        "Account" => by_id_or_name("Account").methods("Accounts", &CRUD).build(),
        "Activity" => EntityDescriptor::builder("Activity")
            .method(Operation::Read, "readActivities")
            .mutability(Mutability::ReadOnly)
            .option_values("trackingType", TRACKING_TYPES)
            .lookup("id", LookupShape::Plain)
            .build(),
        "ApiToken" => api_token(),
        "Contact" => contact(),
        "ContentTag" => by_id_or_name("ContentTag")
            .methods("ContentTags", &CRUD)
            .upsert_by_default(true)
            .duplicate_code(codes::CONTENT_TAG_ALREADY_EXISTS)
            .build(),
        "Conversion" => conversion(),
        "Delivery" => EntityDescriptor::builder("Delivery")
            .methods("Deliveries", &CRUD)
            .lookup("id", LookupShape::Plain)
            .build(),
        "DeliveryGroup" => by_id_or_name("DeliveryGroup")
            .method(Operation::Add, "addDeliveryGroup")
            .method(Operation::Read, "readDeliveryGroups")
            .method(Operation::Update, "updateDeliveryGroup")
            .method(Operation::Delete, "deleteDeliveryGroup")
            .upsert_by_default(true)
            .build(),
        "Field" => by_id_or_name("Field")
            .methods("Fields", &CRUD)
            .upsert_by_default(true)
            .duplicate_code(codes::FIELD_ALREADY_EXISTS)
            .build(),
        "Login" => EntityDescriptor::builder("Login")
            .methods("Logins", &CRUD)
            .lookup("id", LookupShape::Plain)
            .lookup("username", LookupShape::EqualTo)
            .build(),
        "MailList" => by_id_or_name("MailList").methods("Lists", &CRUD).build(),
        "Message" => by_id_or_name("Message")
            .methods("Messages", &CRUD)
            .upsert_by_default(true)
            .duplicate_code(codes::MESSAGE_EXISTS)
            .build(),
        "MessageRule" => by_id_or_name("MessageRule")
            .methods("MessageRules", &CRUD)
            .upsert_by_default(true)
            .duplicate_code(codes::AUTOMATOR_EXISTS)
            .build(),
        "Order" => EntityDescriptor::builder("Order")
            .methods("Orders", &[Operation::AddOrUpdate, Operation::Delete])
            .lookup("id", LookupShape::Plain)
            .build(),
        "Segment" => by_id_or_name("Segment")
            .method(Operation::Read, "readSegments")
            .mutability(Mutability::ReadOnly)
            .build(),
        _ => return None,
    };
    Some(descriptor)
}

fn by_id_or_name(name: &str) -> crate::types::EntityDescriptorBuilder {
    EntityDescriptor::builder(name)
        .lookup("id", LookupShape::Plain)
        .lookup("name", LookupShape::EqualTo)
}

fn api_token() -> EntityDescriptor {
    let permission_values = [
        permissions::READ,
        permissions::WRITE,
        permissions::SEND,
        permissions::READ_WRITE,
        permissions::READ_SEND,
        permissions::WRITE_SEND,
        permissions::ALL,
    ]
    .map(|mask| mask.to_string());

    EntityDescriptor::builder("ApiToken")
        .methods("ApiTokens", &CRUD)
        .option_values("permissions", permission_values)
        .lookup("id", LookupShape::Plain)
        .lookup("accountId", LookupShape::Plain)
        .lookup("name", LookupShape::EqualTo)
        .required_filter_keys(["id", "accountId", "name"])
        .build()
}

fn contact() -> EntityDescriptor {
    EntityDescriptor::builder("Contact")
        .methods(
            "Contacts",
            &[
                Operation::Add,
                Operation::Read,
                Operation::Update,
                Operation::Delete,
                Operation::AddOrUpdate,
            ],
        )
        .lookup("id", LookupShape::Plain)
        .lookup("email", LookupShape::EqualTo)
        .upsert_by_default(true)
        .duplicate_code(codes::CONTACT_ALREADY_EXISTS)
        .persist_key("email")
        .normalize("email", FieldNormalizer::Email)
        .option_values(
            "status",
            ["active", "onboarding", "transactional", "bounce", "unconfirmed", "unsub"],
        )
        .build()
}

fn conversion() -> EntityDescriptor {
    EntityDescriptor::builder("Conversion")
        .method(Operation::Add, "addConversion")
        .method(Operation::Read, "readConversions")
        .mutability(Mutability::AppendOnly)
        .lookup("id", LookupShape::Wrapped)
        .lookup_all_of(vec![
            LookupKey::new("contactId", LookupShape::Wrapped),
            LookupKey::new("deliveryId", LookupShape::Wrapped),
            LookupKey::new("orderId", LookupShape::Wrapped),
        ])
        .empty_filter(field_map([("contactId", json!([]))]))
        .normalize("email", FieldNormalizer::Email)
        .build()
}
