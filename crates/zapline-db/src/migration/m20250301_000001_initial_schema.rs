use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Organizations
        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Organizations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Organizations::Name).string().not_null())
                    .col(ColumnDef::new(Organizations::AccessToken).text().not_null())
                    .col(ColumnDef::new(Organizations::PhoneNumberId).string().not_null())
                    .col(ColumnDef::new(Organizations::BusinessAccountId).string().not_null())
                    .col(ColumnDef::new(Organizations::DisplayPhoneNumber).string().not_null())
                    .col(ColumnDef::new(Organizations::VerifyToken).string().not_null())
                    .col(ColumnDef::new(Organizations::ExternalWebhookUrl).text())
                    .col(ColumnDef::new(Organizations::ExternalWebhookSecret).text())
                    .col(ColumnDef::new(Organizations::ApiKey).string())
                    .col(
                        ColumnDef::new(Organizations::SubscriptionStatus)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Organizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Organizations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_organizations_phone_number_id")
                    .table(Organizations::Table)
                    .col(Organizations::PhoneNumberId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_organizations_api_key \
                 ON organizations (api_key) WHERE api_key IS NOT NULL",
            )
            .await?;

        // Contacts
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Contacts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Contacts::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Contacts::WaId).string().not_null())
                    .col(ColumnDef::new(Contacts::Phone).string().not_null())
                    .col(ColumnDef::new(Contacts::Name).string())
                    .col(ColumnDef::new(Contacts::ProfileName).string())
                    .col(ColumnDef::new(Contacts::Email).string())
                    .col(ColumnDef::new(Contacts::Labels).json_binary().not_null().default("[]"))
                    .col(
                        ColumnDef::new(Contacts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Contacts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contacts_organization")
                            .from(Contacts::Table, Contacts::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_contacts_org_wa_id")
                    .table(Contacts::Table)
                    .col(Contacts::OrganizationId)
                    .col(Contacts::WaId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Conversations
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Conversations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Conversations::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Conversations::ContactId).uuid().not_null())
                    .col(
                        ColumnDef::new(Conversations::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Conversations::AssignedAgentId).uuid())
                    .col(
                        ColumnDef::new(Conversations::UnreadCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Conversations::LastMessageAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Conversations::LastPreview).text())
                    .col(ColumnDef::new(Conversations::BroadcastId).uuid())
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversations_contact")
                            .from(Conversations::Table, Conversations::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_org_last_message")
                    .table(Conversations::Table)
                    .col(Conversations::OrganizationId)
                    .col(Conversations::LastMessageAt)
                    .to_owned(),
            )
            .await?;
        // One live conversation per (organization, contact): a partial
        // unique index, which sea-query cannot express directly.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_conversations_one_live \
                 ON conversations (organization_id, contact_id) \
                 WHERE status IN ('open', 'pending')",
            )
            .await?;

        // Messages
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Messages::ConversationId).uuid().not_null())
                    .col(ColumnDef::new(Messages::Direction).string().not_null())
                    .col(ColumnDef::new(Messages::Kind).string().not_null())
                    .col(ColumnDef::new(Messages::Body).text().not_null().default(""))
                    .col(ColumnDef::new(Messages::Caption).text())
                    .col(ColumnDef::new(Messages::MediaUrl).text())
                    .col(ColumnDef::new(Messages::MediaId).string())
                    .col(ColumnDef::new(Messages::MediaMime).string())
                    .col(ColumnDef::new(Messages::MediaSize).big_integer())
                    .col(ColumnDef::new(Messages::Filename).string())
                    .col(
                        ColumnDef::new(Messages::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Messages::ProviderMessageId).string())
                    .col(ColumnDef::new(Messages::Error).text())
                    .col(
                        ColumnDef::new(Messages::SentAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_conversation")
                            .from(Messages::Table, Messages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_messages_provider_id")
                    .table(Messages::Table)
                    .col(Messages::ProviderMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_conversation_sent")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .col(Messages::SentAt)
                    .to_owned(),
            )
            .await?;

        // Flows
        manager
            .create_table(
                Table::create()
                    .table(Flows::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Flows::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Flows::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Flows::Name).string().not_null())
                    .col(ColumnDef::new(Flows::Definition).json_binary().not_null())
                    .col(ColumnDef::new(Flows::TriggerKeyword).string())
                    .col(ColumnDef::new(Flows::IsDefault).boolean().not_null().default(false))
                    .col(ColumnDef::new(Flows::Enabled).boolean().not_null().default(true))
                    .col(
                        ColumnDef::new(Flows::SessionTimeoutSecs)
                            .big_integer()
                            .not_null()
                            .default(3600),
                    )
                    .col(ColumnDef::new(Flows::WorkingHours).json_binary())
                    .col(
                        ColumnDef::new(Flows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Flows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_flows_organization")
                            .from(Flows::Table, Flows::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        // At most one default flow per organization.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_flows_one_default \
                 ON flows (organization_id) WHERE is_default",
            )
            .await?;

        // Flow sessions
        manager
            .create_table(
                Table::create()
                    .table(FlowSessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FlowSessions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FlowSessions::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(FlowSessions::ContactId).uuid().not_null())
                    .col(ColumnDef::new(FlowSessions::FlowId).uuid().not_null())
                    .col(ColumnDef::new(FlowSessions::CurrentNodeId).string().not_null())
                    .col(
                        ColumnDef::new(FlowSessions::Variables)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(FlowSessions::WaitingOn).string())
                    .col(
                        ColumnDef::new(FlowSessions::LastInteractionAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FlowSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_flow_sessions_org_contact")
                    .table(FlowSessions::Table)
                    .col(FlowSessions::OrganizationId)
                    .col(FlowSessions::ContactId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Broadcasts
        manager
            .create_table(
                Table::create()
                    .table(Broadcasts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Broadcasts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Broadcasts::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Broadcasts::Name).string().not_null())
                    .col(ColumnDef::new(Broadcasts::TemplateName).string().not_null())
                    .col(ColumnDef::new(Broadcasts::TemplateLanguage).string().not_null())
                    .col(ColumnDef::new(Broadcasts::HeaderMediaId).string())
                    .col(ColumnDef::new(Broadcasts::HeaderMediaType).string())
                    .col(
                        ColumnDef::new(Broadcasts::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Broadcasts::TotalCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Broadcasts::SentCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Broadcasts::DeliveredCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Broadcasts::ReadCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Broadcasts::FailedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Broadcasts::RepliedCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Broadcasts::ChatbotEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Broadcasts::ScheduledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Broadcasts::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Broadcasts::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Broadcasts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Broadcasts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_broadcasts_status_scheduled")
                    .table(Broadcasts::Table)
                    .col(Broadcasts::Status)
                    .col(Broadcasts::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        // Broadcast recipients
        manager
            .create_table(
                Table::create()
                    .table(BroadcastRecipients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BroadcastRecipients::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BroadcastRecipients::BroadcastId).uuid().not_null())
                    .col(ColumnDef::new(BroadcastRecipients::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(BroadcastRecipients::Phone).string().not_null())
                    .col(
                        ColumnDef::new(BroadcastRecipients::Variables)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(BroadcastRecipients::ProviderMessageId).string())
                    .col(
                        ColumnDef::new(BroadcastRecipients::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(BroadcastRecipients::Error).text())
                    .col(
                        ColumnDef::new(BroadcastRecipients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BroadcastRecipients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipients_broadcast")
                            .from(
                                BroadcastRecipients::Table,
                                BroadcastRecipients::BroadcastId,
                            )
                            .to(Broadcasts::Table, Broadcasts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_recipients_provider_id")
                    .table(BroadcastRecipients::Table)
                    .col(BroadcastRecipients::ProviderMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_recipients_org_phone")
                    .table(BroadcastRecipients::Table)
                    .col(BroadcastRecipients::OrganizationId)
                    .col(BroadcastRecipients::Phone)
                    .to_owned(),
            )
            .await?;

        // Scheduled notifications
        manager
            .create_table(
                Table::create()
                    .table(ScheduledNotifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledNotifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::OrganizationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledNotifications::ExternalId).string().not_null())
                    .col(ColumnDef::new(ScheduledNotifications::Phone).string().not_null())
                    .col(
                        ColumnDef::new(ScheduledNotifications::TemplateName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::TemplateLanguage)
                            .string()
                            .not_null()
                            .default("en"),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::Payload)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledNotifications::Error).text())
                    .col(
                        ColumnDef::new(ScheduledNotifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_notifications_org_external")
                    .table(ScheduledNotifications::Table)
                    .col(ScheduledNotifications::OrganizationId)
                    .col(ScheduledNotifications::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Quick replies
        manager
            .create_table(
                Table::create()
                    .table(QuickReplies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(QuickReplies::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(QuickReplies::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(QuickReplies::Shortcut).string().not_null())
                    .col(ColumnDef::new(QuickReplies::Body).text().not_null())
                    .col(
                        ColumnDef::new(QuickReplies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(QuickReplies::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_quick_replies_org_shortcut")
                    .table(QuickReplies::Table)
                    .col(QuickReplies::OrganizationId)
                    .col(QuickReplies::Shortcut)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Template mirror
        manager
            .create_table(
                Table::create()
                    .table(Templates::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Templates::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Templates::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Templates::Name).string().not_null())
                    .col(ColumnDef::new(Templates::Language).string().not_null())
                    .col(ColumnDef::new(Templates::Category).string())
                    .col(ColumnDef::new(Templates::Status).string())
                    .col(
                        ColumnDef::new(Templates::Components)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Templates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Templates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uidx_templates_org_name")
                    .table(Templates::Table)
                    .col(Templates::OrganizationId)
                    .col(Templates::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "templates",
            "quick_replies",
            "scheduled_notifications",
            "broadcast_recipients",
            "broadcasts",
            "flow_sessions",
            "flows",
            "messages",
            "conversations",
            "contacts",
            "organizations",
        ] {
            manager
                .get_connection()
                .execute_unprepared(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
                .await?;
        }
        Ok(())
    }
}

#[derive(Iden)]
enum Organizations {
    Table,
    Id,
    Name,
    AccessToken,
    PhoneNumberId,
    BusinessAccountId,
    DisplayPhoneNumber,
    VerifyToken,
    ExternalWebhookUrl,
    ExternalWebhookSecret,
    ApiKey,
    SubscriptionStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Contacts {
    Table,
    Id,
    OrganizationId,
    WaId,
    Phone,
    Name,
    ProfileName,
    Email,
    Labels,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Conversations {
    Table,
    Id,
    OrganizationId,
    ContactId,
    Status,
    AssignedAgentId,
    UnreadCount,
    LastMessageAt,
    LastPreview,
    BroadcastId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Messages {
    Table,
    Id,
    OrganizationId,
    ConversationId,
    Direction,
    Kind,
    Body,
    Caption,
    MediaUrl,
    MediaId,
    MediaMime,
    MediaSize,
    Filename,
    Status,
    ProviderMessageId,
    Error,
    SentAt,
    CreatedAt,
}

#[derive(Iden)]
enum Flows {
    Table,
    Id,
    OrganizationId,
    Name,
    Definition,
    TriggerKeyword,
    IsDefault,
    Enabled,
    SessionTimeoutSecs,
    WorkingHours,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum FlowSessions {
    Table,
    Id,
    OrganizationId,
    ContactId,
    FlowId,
    CurrentNodeId,
    Variables,
    WaitingOn,
    LastInteractionAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Broadcasts {
    Table,
    Id,
    OrganizationId,
    Name,
    TemplateName,
    TemplateLanguage,
    HeaderMediaId,
    HeaderMediaType,
    Status,
    TotalCount,
    SentCount,
    DeliveredCount,
    ReadCount,
    FailedCount,
    RepliedCount,
    ChatbotEnabled,
    ScheduledAt,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum BroadcastRecipients {
    Table,
    Id,
    BroadcastId,
    OrganizationId,
    Phone,
    Variables,
    ProviderMessageId,
    Status,
    Error,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ScheduledNotifications {
    Table,
    Id,
    OrganizationId,
    ExternalId,
    Phone,
    TemplateName,
    TemplateLanguage,
    Payload,
    Status,
    ScheduledAt,
    Error,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum QuickReplies {
    Table,
    Id,
    OrganizationId,
    Shortcut,
    Body,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Templates {
    Table,
    Id,
    OrganizationId,
    Name,
    Language,
    Category,
    Status,
    Components,
    CreatedAt,
    UpdatedAt,
}
