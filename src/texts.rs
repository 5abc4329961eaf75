// src/texts.rs
use crate::models::{CtrPlan, FullAnalysis, KeywordSet, SeoContent, SlidePrompt};

pub const WELCOME: &str = "<b>Добро пожаловать в бот создания инфографики для маркетплейсов!</b>

Я помогу вам создать профессиональную инфографику для товаров на Wildberries и Ozon.

<b>Что я умею:</b>

✏️ <b>Редактор фото</b> - правки фото по описанию
🖼 <b>Убрать фон</b> - товар на чистом белом фоне
📝 <b>SEO + план слайдов</b> - описание карточки и план с фокусом на CTR
🎨 <b>Первый слайд</b> - 3 варианта главного слайда
📑 <b>Слайды по референсу</b> - серия в стиле вашего слайда
🧩 <b>Инфографика под ключ</b> - анализ, SEO и все слайды сразу
🖼 <b>Генерация по промпту</b> - любое изображение по описанию
🔍 <b>Ключевые слова</b> и 📄 <b>SEO-описание</b> для карточки

Выберите нужную функцию:";

pub const HELP: &str = "<b>Справка по боту</b>

<b>Команды:</b>
/start - Главное меню
/menu - Показать меню
/help - Эта справка

<b>Функции:</b>

<b>Убрать фон</b>
Отправьте фото товара, и бот оставит только товар на белом фоне.

<b>Ключевые слова</b>
Введите название товара и категорию - получите список ключевых слов для продвижения на WB/Ozon.

<b>SEO-описание</b>
SEO-заголовок, буллеты для карточки и полное описание товара.

<b>Инфографика под ключ</b>
Фото товара, анализ и SEO, план слайдов, генерация всех слайдов.

<b>Советы:</b>
• Используйте качественные фото товара
• Указывайте точную категорию товара
• Проверяйте план перед генерацией";

pub const MENU: &str = "Главное меню:";
pub const CANCELLED: &str = "Действие отменено.";
pub const IDLE_HINT: &str = "Выберите функцию в меню 👇";
pub const STALE_BUTTON: &str = "Кнопка устарела";
pub const USE_BUTTONS: &str = "⚠️ Выберите вариант кнопкой выше.";
pub const GENERIC_ERROR: &str = "❌ Произошла ошибка.\nПопробуйте позже.";
pub const SESSION_LOST: &str = "❌ Данные сессии утеряны. Начните заново.";
pub const PHOTO_FAILED: &str = "❌ Ошибка загрузки. Попробуйте другое фото.";
pub const SEND_PHOTO: &str = "⚠️ Отправьте фотографию товара.";
pub const SEND_REFERENCE: &str = "⚠️ Отправьте фото референса.";
pub const SEND_NAME: &str = "⚠️ Введите название товара текстом.";
pub const NAME_TOO_SHORT: &str = "⚠️ Название слишком короткое. Введите полное название товара.";
pub const SEND_DESCRIPTION: &str = "⚠️ Введите описание текстом.";
pub const DESCRIPTION_TOO_SHORT: &str = "⚠️ Описание слишком короткое.";
pub const ENTER_CATEGORY: &str = "Введите название категории:";

/// Escapes text for Telegram HTML parse mode.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// At most `max_chars` characters, with "..." appended when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Truncated and escaped, for user or model text inside HTML.
pub fn snippet(text: &str, max_chars: usize) -> String {
    escape(&truncate(text, max_chars))
}

/// Characters after trimming, for input length checks.
pub fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

fn joined(words: &[String]) -> String {
    escape(&words.join(", "))
}

pub fn product_header(name: &str, category: &str) -> String {
    format!(
        "<b>Товар:</b> {}\n<b>Категория:</b> {}",
        escape(name),
        escape(category)
    )
}

pub fn keywords_message(title: &str, keywords: &KeywordSet) -> String {
    let mut lines = vec![format!("<b>{}</b>\n", title)];

    for (label, words) in [
        ("Высокочастотные", &keywords.high_frequency),
        ("Среднечастотные", &keywords.mid_frequency),
        ("Низкочастотные", &keywords.low_frequency),
    ] {
        if !words.is_empty() {
            lines.push(format!("<b>{}:</b>", label));
            lines.push(joined(words));
            lines.push(String::new());
        }
    }

    if lines.len() == 1 && !keywords.keywords.is_empty() {
        lines.push(joined(&keywords.keywords));
    }

    lines.join("\n").trim_end().to_string()
}

pub fn seo_summary(seo: &SeoContent) -> String {
    let mut lines = vec![
        "<b>✅ SEO-контент для товара:</b>\n".to_string(),
        format!("<b>📌 Заголовок:</b>\n{}", escape(&seo.title)),
    ];

    if !seo.card_bullets.is_empty() {
        lines.push("\n<b>📋 Буллеты для карточки:</b>".to_string());
        lines.extend(seo.card_bullets.iter().map(|b| format!("• {}", escape(b))));
    }

    lines.join("\n")
}

pub fn seo_description(description: &str) -> String {
    format!("<b>📝 Полное описание товара:</b>\n\n{}", escape(description))
}

pub fn plan_preview(analysis: &FullAnalysis) -> String {
    let mut lines = vec![
        "<b>План создания инфографики</b>\n".to_string(),
        product_header(&analysis.product_name, &analysis.category),
        format!("<b>Количество слайдов:</b> {}", analysis.num_slides),
        String::new(),
    ];

    if !analysis.seo.title.is_empty() {
        lines.push(format!(
            "<b>SEO-заголовок:</b>\n{}\n",
            escape(&analysis.seo.title)
        ));
    }
    if !analysis.style_guide.is_empty() {
        lines.push(format!("<b>Стиль:</b> {}\n", snippet(&analysis.style_guide, 200)));
    }

    lines.push("<b>Слайды:</b>".to_string());
    for prompt in analysis.slide_prompts.iter().take(7) {
        let crown = if prompt.is_main { "👑 " } else { "" };
        lines.push(format!(
            "{}<b>Слайд {}:</b> {}",
            crown,
            prompt.slide,
            snippet(&prompt.text_overlay, 40)
        ));
    }

    lines.push("\n<i>Нажмите «Генерировать» для создания изображений</i>".to_string());
    lines.join("\n")
}

pub fn prompts_listing(prompts: &[SlidePrompt]) -> String {
    let mut lines = vec!["<b>Текущие промты для слайдов:</b>\n".to_string()];

    for prompt in prompts {
        let crown = if prompt.is_main { "👑 " } else { "" };
        lines.push(format!(
            "{}<b>Слайд {}:</b>\nТекст: {}\nПромт: {}\n",
            crown,
            prompt.slide,
            escape(&prompt.text_overlay),
            snippet(&prompt.prompt, 300)
        ));
    }

    lines.join("\n")
}

pub fn ctr_seo(plan: &CtrPlan) -> String {
    let mut lines = vec![
        "<b>✅ SEO-описание для карточки:</b>\n".to_string(),
        format!("<b>📌 Заголовок:</b>\n{}", escape(&plan.seo.title)),
    ];

    if !plan.seo.bullets.is_empty() {
        lines.push("\n<b>📋 Буллеты:</b>".to_string());
        lines.extend(plan.seo.bullets.iter().map(|b| format!("• {}", escape(b))));
    }
    if !plan.seo.description.is_empty() {
        lines.push(format!("\n<b>📝 Описание:</b>\n{}", escape(&plan.seo.description)));
    }

    lines.join("\n")
}

/// Top five high and mid frequency keywords, or `None` when there are none.
pub fn ctr_keywords(keywords: &KeywordSet) -> Option<String> {
    let mut lines = vec!["<b>🔑 Ключевые слова:</b>\n".to_string()];
    for (label, words) in [
        ("ВЧ", &keywords.high_frequency),
        ("СЧ", &keywords.mid_frequency),
    ] {
        if !words.is_empty() {
            let top: Vec<String> = words.iter().take(5).cloned().collect();
            lines.push(format!("<b>{}:</b> {}", label, joined(&top)));
        }
    }
    (lines.len() > 1).then(|| lines.join("\n"))
}

pub fn ctr_slides(plan: &CtrPlan) -> String {
    let mut lines = vec!["<b>🎨 План слайдов (CTR-оптимизированный):</b>".to_string()];
    for slide in &plan.slide_prompts {
        lines.push(format!(
            "\n<b>Слайд {}:</b> {}\n<i>{}</i>",
            slide.slide,
            escape(&slide.focus),
            escape(&slide.text_ru)
        ));
        if !slide.ctr_elements.is_empty() {
            lines.push(format!("🎯 {}", joined(&slide.ctr_elements)));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_html_specials() {
        assert_eq!(escape("<b>Tom & Jerry</b>"), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");
        assert_eq!(escape("обычный текст"), "обычный текст");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("кроссовки", 4), "крос...");
        assert_eq!(truncate("кот", 4), "кот");
        assert_eq!(snippet("<a>bc", 3), "&lt;a&gt;...");
    }

    #[test]
    fn char_len_trims_and_counts_chars() {
        assert_eq!(char_len("  ёж  "), 2);
    }

    #[test]
    fn keywords_message_lists_groups_in_order() {
        let keywords = KeywordSet {
            high_frequency: vec!["куртка".into(), "пуховик".into()],
            low_frequency: vec!["куртка зимняя женская".into()],
            ..Default::default()
        };
        let text = keywords_message("Ключевые слова:", &keywords);
        assert!(text.starts_with("<b>Ключевые слова:</b>"));
        assert!(text.contains("<b>Высокочастотные:</b>\nкуртка, пуховик"));
        assert!(!text.contains("Среднечастотные"));
        assert!(text.ends_with("куртка зимняя женская"));
    }

    #[test]
    fn generic_keywords_shown_when_unsplit() {
        let keywords = KeywordSet {
            keywords: vec!["чайник".into()],
            ..Default::default()
        };
        assert!(keywords_message("K", &keywords).ends_with("чайник"));
    }

    #[test]
    fn ctr_keywords_none_when_empty() {
        assert!(ctr_keywords(&KeywordSet::default()).is_none());
        let keywords = KeywordSet {
            mid_frequency: (1..=8).map(|i| format!("k{}", i)).collect(),
            ..Default::default()
        };
        assert_eq!(
            ctr_keywords(&keywords).as_deref(),
            Some("<b>🔑 Ключевые слова:</b>\n\n<b>СЧ:</b> k1, k2, k3, k4, k5")
        );
    }

    #[test]
    fn plan_preview_marks_main_slide() {
        let analysis = FullAnalysis {
            product_name: "Куртка".into(),
            category: "Одежда".into(),
            keywords: KeywordSet::default(),
            seo: SeoContent {
                title: "Куртка женская".into(),
                ..Default::default()
            },
            num_slides: 3,
            style_guide: String::new(),
            slide_prompts: vec![
                SlidePrompt {
                    slide: 1,
                    is_main: true,
                    prompt: String::new(),
                    text_overlay: "Тёплая".into(),
                },
                SlidePrompt {
                    slide: 2,
                    is_main: false,
                    prompt: String::new(),
                    text_overlay: "Лёгкая".into(),
                },
            ],
        };
        let text = plan_preview(&analysis);
        assert!(text.contains("<b>Количество слайдов:</b> 3"));
        assert!(text.contains("👑 <b>Слайд 1:</b> Тёплая"));
        assert!(text.contains("\n<b>Слайд 2:</b> Лёгкая"));
    }
}
