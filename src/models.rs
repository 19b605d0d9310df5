//! Entities, request payloads and response shapes for the producer
//! directory. Database rows map 1:1 onto the `FromRow` structs; the
//! `*Out` structs are what the API serializes, with photos, products
//! and sale modes nested under their producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Producer activity, a closed set matching the signup form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Category {
    #[serde(rename = "maraîchage")]
    #[sqlx(rename = "maraîchage")]
    Maraichage,
    #[serde(rename = "élevage")]
    #[sqlx(rename = "élevage")]
    Elevage,
    #[serde(rename = "apiculture")]
    #[sqlx(rename = "apiculture")]
    Apiculture,
    #[serde(rename = "arboriculture")]
    #[sqlx(rename = "arboriculture")]
    Arboriculture,
    #[serde(rename = "céréaliculture")]
    #[sqlx(rename = "céréaliculture")]
    Cerealiculture,
    #[serde(rename = "pêche")]
    #[sqlx(rename = "pêche")]
    Peche,
    #[serde(rename = "brasserie")]
    #[sqlx(rename = "brasserie")]
    Brasserie,
    #[serde(rename = "distillerie")]
    #[sqlx(rename = "distillerie")]
    Distillerie,
    #[serde(rename = "fromagerie")]
    #[sqlx(rename = "fromagerie")]
    Fromagerie,
    #[serde(rename = "boulangerie")]
    #[sqlx(rename = "boulangerie")]
    Boulangerie,
    #[serde(rename = "viticulture")]
    #[sqlx(rename = "viticulture")]
    Viticulture,
    #[serde(rename = "charcuterie")]
    #[sqlx(rename = "charcuterie")]
    Charcuterie,
    #[serde(rename = "autre")]
    #[sqlx(rename = "autre")]
    Autre,
}

impl Default for Category {
    fn default() -> Self {
        Category::Autre
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SaleModeKind {
    OnSite,
    PhoneOrder,
    VendingMachine,
    Delivery,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Availability {
    AllYear,
    Custom,
}

impl Default for Availability {
    fn default() -> Self {
        Availability::AllYear
    }
}

// ---------------------------------------------------------------------------
// Rows

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_producer: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Producer {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: String,
    pub email_contact: String,
    pub website: String,
    pub opening_hours: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProducerPhoto {
    pub id: i64,
    pub producer_id: i64,
    pub image_file: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SaleMode {
    pub id: i64,
    pub producer_id: i64,
    pub mode_type: SaleModeKind,
    pub title: String,
    pub instructions: String,
    pub phone_number: String,
    pub website_url: String,
    pub is_24_7: bool,
    pub location_address: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub market_info: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OpeningHours {
    pub id: i64,
    pub sale_mode_id: i64,
    pub day_of_week: i64,
    pub is_closed: bool,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub display_name: String,
    pub position: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub producer_id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub availability_type: Availability,
    pub availability_start_month: Option<i64>,
    pub availability_end_month: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductPhoto {
    pub id: i64,
    pub product_id: i64,
    pub image_file: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Responses

#[derive(Debug, Clone, Serialize)]
pub struct UserOut {
    pub id: i64,
    pub email: String,
    pub is_producer: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_producer: user.is_producer,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoOut {
    pub id: i64,
    pub image_file: String,
    pub created_at: DateTime<Utc>,
}

/// Stored paths are relative to the media root; responses expose the
/// served URL.
pub fn media_url(stored: &str) -> String {
    format!("/media/{stored}")
}

impl From<ProducerPhoto> for PhotoOut {
    fn from(photo: ProducerPhoto) -> Self {
        Self {
            id: photo.id,
            image_file: media_url(&photo.image_file),
            created_at: photo.created_at,
        }
    }
}

impl From<ProductPhoto> for PhotoOut {
    fn from(photo: ProductPhoto) -> Self {
        Self {
            id: photo.id,
            image_file: media_url(&photo.image_file),
            created_at: photo.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryOut {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub display_name: String,
    #[serde(rename = "order")]
    pub position: i64,
}

impl From<ProductCategory> for CategoryOut {
    fn from(c: ProductCategory) -> Self {
        Self {
            id: c.id,
            name: c.name,
            icon: c.icon,
            display_name: c.display_name,
            position: c.position,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpeningHoursOut {
    pub id: i64,
    pub day_of_week: i64,
    pub is_closed: bool,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
}

impl From<OpeningHours> for OpeningHoursOut {
    fn from(h: OpeningHours) -> Self {
        Self {
            id: h.id,
            day_of_week: h.day_of_week,
            is_closed: h.is_closed,
            opening_time: h.opening_time,
            closing_time: h.closing_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleModeOut {
    pub id: i64,
    pub producer_id: i64,
    pub mode_type: SaleModeKind,
    pub title: String,
    pub instructions: String,
    pub phone_number: String,
    pub website_url: String,
    pub is_24_7: bool,
    pub location_address: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub market_info: String,
    #[serde(rename = "order")]
    pub position: i64,
    pub opening_hours: Vec<OpeningHoursOut>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SaleModeOut {
    pub fn assemble(mode: SaleMode, hours: Vec<OpeningHours>) -> Self {
        Self {
            id: mode.id,
            producer_id: mode.producer_id,
            mode_type: mode.mode_type,
            title: mode.title,
            instructions: mode.instructions,
            phone_number: mode.phone_number,
            website_url: mode.website_url,
            is_24_7: mode.is_24_7,
            location_address: mode.location_address,
            location_latitude: mode.location_latitude,
            location_longitude: mode.location_longitude,
            market_info: mode.market_info,
            position: mode.position,
            opening_hours: hours.into_iter().map(OpeningHoursOut::from).collect(),
            created_at: mode.created_at,
            updated_at: mode.updated_at,
        }
    }
}

/// Producer reference embedded in product responses, kept shallow to
/// avoid recursing back into the full profile.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerBrief {
    pub id: i64,
    pub name: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductOut {
    pub id: i64,
    pub producer: ProducerBrief,
    pub category: Option<CategoryOut>,
    pub name: String,
    pub description: String,
    pub availability_type: Availability,
    pub availability_start_month: Option<i64>,
    pub availability_end_month: Option<i64>,
    pub photos: Vec<PhotoOut>,
    pub photo_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducerOut {
    pub id: i64,
    pub user: UserOut,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub phone: String,
    pub email_contact: String,
    pub website: String,
    pub opening_hours: String,
    pub photos: Vec<PhotoOut>,
    pub photo_count: usize,
    pub products: Vec<ProductOut>,
    pub sale_modes: Vec<SaleModeOut>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Requests

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_producer: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub email: Option<String>,
    pub is_producer: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProducerCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email_contact: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub opening_hours: String,
}

impl ProducerCreate {
    pub fn validate(&self) -> AppResult<()> {
        validate_producer_name(&self.name)?;
        validate_description(&self.description, 2000)?;
        validate_coordinates(self.latitude, self.longitude)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProducerUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub email_contact: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<String>,
}

impl ProducerUpdate {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_producer_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description, 2000)?;
        }
        if let Some(latitude) = self.latitude {
            validate_latitude(latitude)?;
        }
        if let Some(longitude) = self.longitude {
            validate_longitude(longitude)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpeningHoursIn {
    pub day_of_week: i64,
    #[serde(default)]
    pub is_closed: bool,
    pub opening_time: Option<String>,
    pub closing_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaleModeCreate {
    pub mode_type: SaleModeKind,
    pub title: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub website_url: String,
    #[serde(default)]
    pub is_24_7: bool,
    #[serde(default)]
    pub location_address: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    #[serde(default)]
    pub market_info: String,
    #[serde(default, rename = "order")]
    pub position: i64,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHoursIn>,
}

impl SaleModeCreate {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("A title is required."));
        }
        validate_sale_mode_fields(
            self.mode_type,
            &self.phone_number,
            self.location_latitude,
            self.location_longitude,
        )?;
        validate_opening_hours(&self.opening_hours)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleModeUpdate {
    pub mode_type: Option<SaleModeKind>,
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub phone_number: Option<String>,
    pub website_url: Option<String>,
    pub is_24_7: Option<bool>,
    pub location_address: Option<String>,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub market_info: Option<String>,
    #[serde(rename = "order")]
    pub position: Option<i64>,
    /// When present, replaces the full set of entries.
    pub opening_hours: Option<Vec<OpeningHoursIn>>,
}

impl SaleModeUpdate {
    /// Validation runs against the merged state, so a kind switch to
    /// phone_order still requires a phone number from either side.
    pub fn validate(&self, current: &SaleMode) -> AppResult<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(AppError::validation("A title is required."));
            }
        }
        let mode_type = self.mode_type.unwrap_or(current.mode_type);
        let phone_number = self
            .phone_number
            .as_deref()
            .unwrap_or(&current.phone_number);
        validate_sale_mode_fields(
            mode_type,
            phone_number,
            self.location_latitude.or(current.location_latitude),
            self.location_longitude.or(current.location_longitude),
        )?;
        if let Some(hours) = &self.opening_hours {
            validate_opening_hours(hours)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub availability_type: Availability,
    pub availability_start_month: Option<i64>,
    pub availability_end_month: Option<i64>,
}

impl ProductCreate {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().chars().count() < 2 {
            return Err(AppError::validation(
                "Product name must be at least 2 characters long.",
            ));
        }
        validate_description(&self.description, 1000)?;
        validate_availability(
            self.availability_type,
            self.availability_start_month,
            self.availability_end_month,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub availability_type: Option<Availability>,
    pub availability_start_month: Option<i64>,
    pub availability_end_month: Option<i64>,
}

impl ProductUpdate {
    pub fn validate(&self, current: &Product) -> AppResult<()> {
        if let Some(name) = &self.name {
            if name.trim().chars().count() < 2 {
                return Err(AppError::validation(
                    "Product name must be at least 2 characters long.",
                ));
            }
        }
        if let Some(description) = &self.description {
            validate_description(description, 1000)?;
        }
        validate_availability(
            self.availability_type.unwrap_or(current.availability_type),
            self.availability_start_month
                .or(current.availability_start_month),
            self.availability_end_month
                .or(current.availability_end_month),
        )
    }
}

// ---------------------------------------------------------------------------
// Validation

pub fn validate_latitude(latitude: f64) -> AppResult<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::validation("Latitude must be between -90 and 90."));
    }
    Ok(())
}

pub fn validate_longitude(longitude: f64) -> AppResult<()> {
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation(
            "Longitude must be between -180 and 180.",
        ));
    }
    Ok(())
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> AppResult<()> {
    validate_latitude(latitude)?;
    validate_longitude(longitude)
}

/// Coordinates are stored with 7 decimal places, matching the API's
/// fixed-precision contract.
pub fn round_coordinate(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

fn validate_producer_name(name: &str) -> AppResult<()> {
    if name.trim().chars().count() < 2 {
        return Err(AppError::validation(
            "Producer name must be at least 2 characters long.",
        ));
    }
    Ok(())
}

fn validate_description(description: &str, max: usize) -> AppResult<()> {
    if description.chars().count() > max {
        return Err(AppError::validation(format!(
            "Description must be at most {max} characters long."
        )));
    }
    Ok(())
}

fn validate_sale_mode_fields(
    mode_type: SaleModeKind,
    phone_number: &str,
    location_latitude: Option<f64>,
    location_longitude: Option<f64>,
) -> AppResult<()> {
    if mode_type == SaleModeKind::PhoneOrder && phone_number.trim().is_empty() {
        return Err(AppError::validation(
            "A phone number is required for phone orders.",
        ));
    }
    if let Some(latitude) = location_latitude {
        validate_latitude(latitude)?;
    }
    if let Some(longitude) = location_longitude {
        validate_longitude(longitude)?;
    }
    Ok(())
}

fn validate_opening_hours(entries: &[OpeningHoursIn]) -> AppResult<()> {
    let mut seen_days = [false; 7];
    for entry in entries {
        if !(0..=6).contains(&entry.day_of_week) {
            return Err(AppError::validation(
                "day_of_week must be between 0 (Monday) and 6 (Sunday).",
            ));
        }
        let day = entry.day_of_week as usize;
        if seen_days[day] {
            return Err(AppError::validation(
                "Only one opening hours entry is allowed per day.",
            ));
        }
        seen_days[day] = true;

        if entry.is_closed {
            continue;
        }
        let (opening, closing) = match (&entry.opening_time, &entry.closing_time) {
            (Some(o), Some(c)) => (o, c),
            _ => {
                return Err(AppError::validation(
                    "Opening and closing times are required when the day is not closed.",
                ))
            }
        };
        let opening = parse_time(opening)?;
        let closing = parse_time(closing)?;
        if opening >= closing {
            return Err(AppError::validation(
                "Opening time must be before closing time.",
            ));
        }
    }
    Ok(())
}

fn parse_time(value: &str) -> AppResult<(u8, u8)> {
    let invalid = || AppError::validation(format!("Invalid time \"{value}\", expected HH:MM."));

    let (hours, minutes) = value.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok((hours, minutes))
}

fn validate_availability(
    availability: Availability,
    start_month: Option<i64>,
    end_month: Option<i64>,
) -> AppResult<()> {
    if availability == Availability::AllYear {
        return Ok(());
    }
    let (start, end) = match (start_month, end_month) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(AppError::validation(
                "Start and end months are required for a custom availability period.",
            ))
        }
    };
    if !(1..=12).contains(&start) || !(1..=12).contains(&end) {
        return Err(AppError::validation("Months must be between 1 and 12."));
    }
    Ok(())
}
