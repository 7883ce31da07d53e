table! {
    users (id) {
        id -> Integer,
        phone -> VarChar,
        display_name -> VarChar,
        points -> Integer,
        referral_code -> VarChar,
        referred_by -> Nullable<Integer>,
        is_active -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    user_roles (id) {
        id -> Integer,
        user_id -> Integer,
        role -> VarChar,
    }
}

table! {
    stores (id) {
        id -> Integer,
        user_id -> Integer,
        name -> VarChar,
        city -> Nullable<VarChar>,
        is_active -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    store_follows (id) {
        id -> Integer,
        store_id -> Integer,
        user_id -> Integer,
        created_at -> Timestamp,
    }
}

table! {
    categories (id) {
        id -> Integer,
        name -> VarChar,
        parent_id -> Nullable<Integer>,
        position -> Integer,
    }
}

table! {
    attributes (id) {
        id -> Integer,
        category_id -> Integer,
        name -> VarChar,
        input_type -> VarChar,
        ui_type -> VarChar,
        is_required -> Bool,
        position -> Integer,
    }
}

table! {
    attribute_options (id) {
        id -> Integer,
        attribute_id -> Integer,
        value -> VarChar,
        position -> Integer,
    }
}

table! {
    listings (id) {
        id -> Integer,
        listing_type -> VarChar,
        user_id -> Integer,
        category_id -> Integer,
        city -> VarChar,
        title -> VarChar,
        description -> VarChar,
        is_approved -> Bool,
        auto_rejected -> Bool,
        moderation_reason -> Nullable<VarChar>,
        approved_by -> Nullable<Integer>,
        approved_at -> Nullable<Timestamp>,
        rejected_by -> Nullable<Integer>,
        rejected_at -> Nullable<Timestamp>,
        is_active -> Bool,
        is_deleted -> Bool,
        deleted_at -> Nullable<Timestamp>,
        was_edited -> Bool,
        followers_notified -> Bool,
        featured_until -> Nullable<Timestamp>,
        views_count -> Integer,
        show_phone -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        published_at -> Timestamp,
    }
}

table! {
    items (listing_id) {
        listing_id -> Integer,
        price -> Double,
        condition -> VarChar,
        sold_on_site -> Nullable<Bool>,
        cancel_reason -> Nullable<VarChar>,
    }
}

table! {
    requests (listing_id) {
        listing_id -> Integer,
        budget -> Nullable<Double>,
        condition_preference -> VarChar,
    }
}

table! {
    item_attribute_values (id) {
        id -> Integer,
        listing_id -> Integer,
        attribute_id -> Integer,
        value -> VarChar,
    }
}

table! {
    request_attribute_values (id) {
        id -> Integer,
        listing_id -> Integer,
        attribute_id -> Integer,
        value -> VarChar,
    }
}

table! {
    listing_photos (id) {
        id -> Integer,
        listing_id -> Integer,
        image -> VarChar,
        is_main -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    favorites (id) {
        id -> Integer,
        user_id -> Integer,
        listing_id -> Integer,
        created_at -> Timestamp,
    }
}

table! {
    conversations (id) {
        id -> Integer,
        listing_id -> Nullable<Integer>,
        store_id -> Nullable<Integer>,
        buyer_id -> Integer,
        seller_id -> Integer,
        created_at -> Timestamp,
    }
}

table! {
    messages (id) {
        id -> Integer,
        conversation_id -> Integer,
        sender_id -> Integer,
        body -> VarChar,
        is_read -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    listing_promotions (id) {
        id -> Integer,
        listing_id -> Integer,
        kind -> VarChar,
        status -> VarChar,
        duration_days -> Integer,
        points_cost -> Integer,
        paid_with_points -> Bool,
        paid_at -> Nullable<Timestamp>,
        starts_at -> Nullable<Timestamp>,
        ends_at -> Nullable<Timestamp>,
        activated_at -> Nullable<Timestamp>,
        expired_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

table! {
    promotion_events (id) {
        id -> Integer,
        promotion_id -> Integer,
        kind -> VarChar,
        meta -> Jsonb,
        created_at -> Timestamp,
    }
}

table! {
    points_transactions (id) {
        id -> Integer,
        user_id -> Integer,
        kind -> VarChar,
        delta -> Integer,
        balance_after -> Integer,
        reason -> VarChar,
        ref_promotion_id -> Nullable<Integer>,
        meta -> Jsonb,
        created_at -> Timestamp,
    }
}

table! {
    notifications (id) {
        id -> Integer,
        user_id -> Integer,
        kind -> VarChar,
        status -> VarChar,
        title -> VarChar,
        body -> VarChar,
        listing_id -> Nullable<Integer>,
        is_read -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    issue_reports (id) {
        id -> Integer,
        listing_id -> Integer,
        reporter_id -> Nullable<Integer>,
        reason -> VarChar,
        message -> VarChar,
        created_at -> Timestamp,
    }
}

joinable!(listings -> users (user_id));
joinable!(listings -> categories (category_id));
joinable!(items -> listings (listing_id));
joinable!(requests -> listings (listing_id));
joinable!(stores -> users (user_id));
joinable!(messages -> conversations (conversation_id));
joinable!(listing_promotions -> listings (listing_id));
joinable!(promotion_events -> listing_promotions (promotion_id));
joinable!(points_transactions -> users (user_id));
joinable!(favorites -> listings (listing_id));
joinable!(attribute_options -> attributes (attribute_id));

allow_tables_to_appear_in_same_query!(
    users,
    user_roles,
    stores,
    store_follows,
    categories,
    attributes,
    attribute_options,
    listings,
    items,
    requests,
    item_attribute_values,
    request_attribute_values,
    listing_photos,
    favorites,
    conversations,
    messages,
    listing_promotions,
    promotion_events,
    points_transactions,
    notifications,
    issue_reports,
);
