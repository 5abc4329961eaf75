// src/keyboards.rs
use crate::services::telegram::{InlineKeyboardButton as Button, InlineKeyboardMarkup};

const CATEGORIES: [(&str, &str, &str); 8] = [
    ("👕 Одежда", "cat_clothing", "Одежда"),
    ("👟 Обувь", "cat_shoes", "Обувь"),
    ("📱 Электроника", "cat_electronics", "Электроника"),
    ("🏠 Дом и сад", "cat_home", "Дом и сад"),
    ("💄 Красота", "cat_beauty", "Красота и здоровье"),
    ("🧸 Детские товары", "cat_kids", "Детские товары"),
    ("🏋️ Спорт", "cat_sport", "Спорт и отдых"),
    ("🛠 Инструменты", "cat_tools", "Инструменты"),
];

pub const CUSTOM_CATEGORY: &str = "cat_custom";

fn rows(rows: Vec<Vec<Button>>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}

fn single(text: &str, data: &str) -> Vec<Button> {
    vec![Button::new(text, data)]
}

fn cancel_row() -> Vec<Button> {
    single("❌ Отмена", "cancel")
}

pub fn main_menu() -> InlineKeyboardMarkup {
    rows(vec![
        single("✏️ Умный редактор фото", "edit_photo"),
        single("🖼 Убрать фон", "remove_bg"),
        single("📝 SEO + план слайдов", "seo_slides"),
        single("🎨 Создать первый слайд", "first_slide"),
        single("📑 Слайды по референсу", "slides_from_ref"),
        single("🧩 Инфографика под ключ", "infographic"),
        single("🖼 Генерация по промпту", "free_image"),
        vec![
            Button::new("🔍 Ключевые слова", "keywords"),
            Button::new("📄 SEO-описание", "seo"),
        ],
    ])
}

pub fn cancel() -> InlineKeyboardMarkup {
    rows(vec![cancel_row()])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    rows(vec![single("🏠 В главное меню", "main_menu")])
}

pub fn categories() -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<Button>> = CATEGORIES
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|(text, data, _)| Button::new(text, data))
                .collect()
        })
        .collect();
    keyboard.push(single("✏️ Ввести свою", CUSTOM_CATEGORY));
    keyboard.push(cancel_row());
    rows(keyboard)
}

/// Display name for a category button; unknown keys map to "Другое".
pub fn category_name(callback_data: &str) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(_, data, _)| *data == callback_data)
        .map(|(_, _, name)| *name)
        .unwrap_or("Другое")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryChoice {
    Named(&'static str),
    Custom,
}

/// `None` for callbacks that are not category buttons.
pub fn parse_category(callback_data: &str) -> Option<CategoryChoice> {
    if callback_data == CUSTOM_CATEGORY {
        Some(CategoryChoice::Custom)
    } else if callback_data.starts_with("cat_") {
        Some(CategoryChoice::Named(category_name(callback_data)))
    } else {
        None
    }
}

pub fn slide_count() -> InlineKeyboardMarkup {
    rows(vec![
        vec![
            Button::new("3", "slides_3"),
            Button::new("4", "slides_4"),
            Button::new("5", "slides_5"),
        ],
        vec![
            Button::new("6", "slides_6"),
            Button::new("7", "slides_7"),
            Button::new("🤖 Авто", "slides_auto"),
        ],
        cancel_row(),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideChoice {
    Fixed(u32),
    Auto,
}

pub fn parse_slide_choice(callback_data: &str) -> Option<SlideChoice> {
    match callback_data.strip_prefix("slides_")? {
        "auto" => Some(SlideChoice::Auto),
        n => n.parse().ok().map(SlideChoice::Fixed),
    }
}

pub fn edit_plan() -> InlineKeyboardMarkup {
    rows(vec![
        single("✅ Генерировать", "generate_start"),
        single("📝 Изменить кол-во слайдов", "edit_slides_count"),
        single("✏️ Редактировать промты", "edit_prompts"),
        cancel_row(),
    ])
}

pub fn seo_use_existing() -> InlineKeyboardMarkup {
    rows(vec![
        single("✅ Использовать", "seo_use_existing"),
        single("📝 Ввести новые", "seo_new_data"),
        cancel_row(),
    ])
}

pub fn infographic_use_image() -> InlineKeyboardMarkup {
    rows(vec![
        single("✅ Использовать это фото", "infographic_use_existing"),
        single("📷 Загрузить новое", "infographic_new_photo"),
        cancel_row(),
    ])
}

pub fn reference_choice() -> InlineKeyboardMarkup {
    rows(vec![
        single("📷 С референсом", "first_with_ref"),
        single("🎨 Без референса", "first_no_ref"),
        cancel_row(),
    ])
}

pub fn extra_reference() -> InlineKeyboardMarkup {
    rows(vec![
        single("➕ Добавить референс", "add_extra_ref"),
        single("⏭ Пропустить", "skip_extra_ref"),
        cancel_row(),
    ])
}

pub fn more_slides() -> InlineKeyboardMarkup {
    rows(vec![
        single("➕ Ещё слайд", "generate_more_slide"),
        single("✅ Готово", "slides_done"),
    ])
}

pub fn free_result() -> InlineKeyboardMarkup {
    rows(vec![
        single("🔄 Ещё вариант", "free_regenerate"),
        vec![
            Button::new("✏️ Новый промпт", "free_new_prompt"),
            Button::new("🏠 Меню", "back_to_menu"),
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_follow_buttons() {
        assert_eq!(category_name("cat_beauty"), "Красота и здоровье");
        assert_eq!(category_name("cat_sport"), "Спорт и отдых");
        assert_eq!(category_name("cat_unknown"), "Другое");
    }

    #[test]
    fn category_callbacks_parse() {
        assert_eq!(parse_category("cat_home"), Some(CategoryChoice::Named("Дом и сад")));
        assert_eq!(parse_category("cat_custom"), Some(CategoryChoice::Custom));
        assert_eq!(parse_category("cat_pets"), Some(CategoryChoice::Named("Другое")));
        assert_eq!(parse_category("slides_3"), None);
    }

    #[test]
    fn categories_are_laid_out_in_pairs() {
        let keyboard = categories();
        assert_eq!(keyboard.inline_keyboard.len(), 6);
        assert!(keyboard.inline_keyboard[..4].iter().all(|row| row.len() == 2));
        assert!(keyboard.callbacks().any(|d| d == CUSTOM_CATEGORY));
    }

    #[test]
    fn slide_choices_parse() {
        assert_eq!(parse_slide_choice("slides_4"), Some(SlideChoice::Fixed(4)));
        assert_eq!(parse_slide_choice("slides_auto"), Some(SlideChoice::Auto));
        assert_eq!(parse_slide_choice("slides_x"), None);
        assert_eq!(parse_slide_choice("cat_home"), None);
    }

    #[test]
    fn main_menu_offers_every_flow() {
        let menu = main_menu();
        let callbacks: Vec<&str> = menu.callbacks().collect();
        for entry in [
            "remove_bg",
            "keywords",
            "seo",
            "infographic",
            "seo_slides",
            "first_slide",
            "slides_from_ref",
            "free_image",
            "edit_photo",
        ] {
            assert!(callbacks.contains(&entry), "missing {}", entry);
        }
    }
}
