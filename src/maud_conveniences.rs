use crate::data::user::{Role, User};
use email_address::EmailAddress;
use maud::{Markup, Render, html};
use std::fmt::Write;

pub fn render_table<const N: usize>(
    overall_title: &'static str,
    titles: [&'static str; N],
    items: Vec<[Markup; N]>,
) -> Markup {
    html! {
        div class="container mx-auto" {
            (title(overall_title))
            div class="overflow-x-auto" {
                table class="min-w-full bg-gray-800 rounded shadow-md" {
                    thead class="bg-gray-700" {
                        tr {
                            @for title in titles {
                                th class="py-2 px-4 text-left font-semibold text-gray-300" {(title)}
                            }
                        }
                    }
                    tbody {
                        @if items.is_empty() {
                            tr {
                                td colspan=(N) class="py-2 px-4 text-gray-400 italic" {"Nothing here yet"}
                            }
                        }
                        @for row in items {
                            tr {
                                @for col in row {
                                    td class="py-2 px-4 border-b border-gray-600 text-gray-200" {(col)}
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn supertitle(s: impl Render) -> Markup {
    html! {
        h1 class="text-3xl font-bold mb-6 text-center" {(s)}
    }
}

pub fn title(s: impl Render) -> Markup {
    html! {
        h1 class="text-2xl font-semibold mb-4" {(s)}
    }
}

pub fn subtitle(s: impl Render) -> Markup {
    html! {
        h2 class="text-xl font-semibold mb-2 text-gray-200" {(s)}
    }
}

pub fn form_element(id: &str, label: &str, input: Markup) -> Markup {
    html! {
        div class="mb-4" {
            label for=(id) class="block text-sm font-bold mb-2 text-gray-300" {(label)}
            (input)
        }
    }
}

pub fn simple_form_element(
    id: &str,
    label: &str,
    required: bool,
    input_type: Option<&str>,
    value: Option<&str>,
) -> Markup {
    form_element(
        id,
        label,
        html! {
            input required[required] id=(id) name=(id) type=(input_type.unwrap_or("text")) value=[value] class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600";
        },
    )
}

pub fn form_submit_button(text: Option<&str>) -> Markup {
    html! {
        div class="flex items-center justify-between" {
            button type="submit" class="bg-blue-500 hover:bg-blue-700 font-bold py-2 px-4 rounded focus:outline-none focus:shadow-outline" {
                (text.unwrap_or("Submit"))
            }
        }
    }
}

pub fn errors_list<'a>(heading: Option<&str>, errors: impl Iterator<Item = &'a str>) -> Markup {
    html! {
        div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-3 rounded relative mb-4" {
            strong class="font-bold" {(heading.unwrap_or("Please fix the following:"))}
            ul class="list-disc list-inside" {
                @for error in errors {
                    li {(error)}
                }
            }
        }
    }
}

pub fn stat_card(label: &str, value: impl Render) -> Markup {
    html! {
        div class="bg-gray-800 rounded-lg shadow-md p-4 text-center" {
            p class="text-sm text-gray-400" {(label)}
            p class="text-2xl font-bold" {(value)}
        }
    }
}

///percentages are always shown to 2dp
pub struct Percentage(pub f64);

impl Render for Percentage {
    fn render_to(&self, buffer: &mut String) {
        let _ = write!(buffer, "{:.2}%", self.0);
    }
}

pub struct Email<'a>(pub &'a EmailAddress);

impl Render for Email<'_> {
    fn render(&self) -> Markup {
        html! {
            a href={"mailto:" (self.0)} target="_blank" class="text-blue-200 underline" {(self.0)}
        }
    }
}

pub fn render_nav(user: Option<&User>, school_name: &str) -> Markup {
    let link = |href: &str, text: &str| {
        html! {
            a href=(href) class="hover:bg-gray-700 px-3 py-2 rounded" {(text)}
        }
    };

    html! {
        nav class="w-full bg-gray-800 shadow-md mb-4" {
            div class="container mx-auto flex flex-row items-center justify-between p-4" {
                a href="/" class="text-xl font-semibold" {(school_name)}
                div class="flex flex-row items-center space-x-2" {
                    @if let Some(user) = user {
                        @match user.role() {
                            Role::Student => {
                                (link("/student/dashboard", "Dashboard"))
                            }
                            Role::Parent => {
                                (link("/parent/dashboard", "Dashboard"))
                            }
                            Role::Teacher => {
                                (link("/teacher/dashboard", "Dashboard"))
                                (link("/teacher/attendance", "Attendance"))
                                (link("/teacher/progress", "Progress"))
                                (link("/teacher/reports", "Reports"))
                                (link("/people", "People"))
                            }
                        }
                        span class="text-gray-400 px-3" {(user) " (" (user.role()) ")"}
                        form method="post" action="/logout" {
                            button type="submit" class="bg-red-600 hover:bg-red-800 font-bold py-2 px-4 rounded" {"Logout"}
                        }
                    } @else {
                        (link("/login", "Login"))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_render_to_two_places() {
        assert_eq!(Percentage(66.666).render().0, "66.67%");
        assert_eq!(Percentage(0.0).render().0, "0.00%");
    }

    #[test]
    fn logged_out_nav_only_offers_login() {
        let nav = render_nav(None, "Hill College").0;
        assert!(nav.contains("/login"));
        assert!(!nav.contains("/logout"));
    }
}
