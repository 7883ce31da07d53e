//! Typed identifiers shared by models, repos and services

id_newtype!(
    UserId,
    StoreId,
    CategoryId,
    AttributeId,
    AttributeOptionId,
    ListingId,
    AttributeValueId,
    PhotoId,
    FavoriteId,
    StoreFollowId,
    ConversationId,
    MessageId,
    PromotionId,
    PromotionEventId,
    PointsTransactionId,
    NotificationId,
    IssueReportId,
    RoleId,
);
