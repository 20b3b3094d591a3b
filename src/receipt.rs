use crate::store::{Payment, SchoolInfo};

pub const MONTH_NAMES: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

pub fn month_name(month: u32) -> &'static str {
    if (1..=12).contains(&month) {
        MONTH_NAMES[(month - 1) as usize]
    } else {
        ""
    }
}

pub fn payment_method_label(method: &str) -> &'static str {
    match method {
        "cash" => "Tunai",
        "transfer" => "Transfer",
        _ => "Lainnya",
    }
}

/// "Rp 1.234.567" with Indonesian dot grouping. Amounts are whole rupiah.
pub fn format_currency(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// Indonesian amount-in-words, magnitudes up to billions, always suffixed
/// with "rupiah": 150000 -> "seratus lima puluh ribu rupiah".
pub fn amount_in_words(amount: i64) -> String {
    format!("{} rupiah", number_to_words(amount))
}

fn number_to_words(num: i64) -> String {
    if num == 0 {
        return "nol".to_string();
    }
    if num < 0 {
        return format!("minus {}", number_to_words(-num));
    }

    const ONES: [&str; 10] = [
        "", "satu", "dua", "tiga", "empat", "lima", "enam", "tujuh", "delapan", "sembilan",
    ];
    const TEENS: [&str; 10] = [
        "sepuluh",
        "sebelas",
        "dua belas",
        "tiga belas",
        "empat belas",
        "lima belas",
        "enam belas",
        "tujuh belas",
        "delapan belas",
        "sembilan belas",
    ];
    const TENS: [&str; 10] = [
        "",
        "sepuluh",
        "dua puluh",
        "tiga puluh",
        "empat puluh",
        "lima puluh",
        "enam puluh",
        "tujuh puluh",
        "delapan puluh",
        "sembilan puluh",
    ];

    let mut num = num;
    let mut words = String::new();

    if num / 1_000_000_000 > 0 {
        let billions = num / 1_000_000_000;
        if billions == 1 {
            words.push_str("satu milyar ");
        } else {
            words.push_str(&format!("{} milyar ", number_to_words(billions)));
        }
        num %= 1_000_000_000;
    }

    if num / 1_000_000 > 0 {
        let millions = num / 1_000_000;
        if millions == 1 {
            words.push_str("satu juta ");
        } else {
            words.push_str(&format!("{} juta ", number_to_words(millions)));
        }
        num %= 1_000_000;
    }

    if num / 1_000 > 0 {
        let thousands = num / 1_000;
        if thousands == 1 {
            // "seribu", never "satu ribu".
            words.push_str("seribu ");
        } else {
            words.push_str(&format!("{} ribu ", number_to_words(thousands)));
        }
        num %= 1_000;
    }

    if num / 100 > 0 {
        let hundreds = num / 100;
        if hundreds == 1 {
            words.push_str("seratus ");
        } else {
            words.push_str(&format!("{} ratus ", ONES[hundreds as usize]));
        }
        num %= 100;
    }

    if num > 0 {
        if num < 10 {
            words.push_str(ONES[num as usize]);
        } else if num < 20 {
            words.push_str(TEENS[(num - 10) as usize]);
        } else {
            words.push_str(TENS[(num / 10) as usize]);
            if num % 10 > 0 {
                words.push(' ');
                words.push_str(ONES[(num % 10) as usize]);
            }
        }
    }

    words.trim_end().to_string()
}

/// Receipt rendering falls back to stock school details when no singleton
/// row has been saved yet.
pub fn default_school_info() -> SchoolInfo {
    SchoolInfo {
        id: 0,
        name: "SMP Negeri 1".to_string(),
        address: "Jl. Pendidikan No. 1".to_string(),
        phone: "021-12345678".to_string(),
        email: "info@smpn1.sch.id".to_string(),
        principal_name: "Drs. Ahmad Sudirman, M.Pd".to_string(),
        npsn: "12345678".to_string(),
        logo: None,
        updated_at: String::new(),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn payment_purpose(payment: &Payment) -> String {
    match payment.month {
        Some(m) => format!(
            "{} - {} {}",
            payment.payment_type_name,
            month_name(m as u32),
            payment.year
        ),
        None => payment.payment_type_name.clone(),
    }
}

/// Full-page receipt layout for A4 printing.
pub fn render_receipt_a4(payment: &Payment, school: &SchoolInfo) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str(&format!(
        "<title>Kuitansi - {}</title>\n",
        html_escape(&payment.receipt_number)
    ));
    html.push_str(
        "<style>\nbody { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 40px; }\n\
         .header { text-align: center; border-bottom: 3px solid #000; padding-bottom: 15px; }\n\
         .title { text-align: center; margin: 25px 0; text-decoration: underline; }\n\
         .receipt-no { text-align: right; margin-bottom: 25px; }\n\
         .row { margin: 6px 0; }\n\
         .label { display: inline-block; width: 180px; }\n\
         .amount-box { border: 2px solid #000; padding: 12px; margin: 20px 0; }\n\
         .footer { display: flex; justify-content: space-between; margin-top: 40px; }\n\
         .signature { text-align: center; width: 200px; }\n\
         .signature-line { border-top: 2px solid #000; margin-top: 80px; padding-top: 8px; }\n\
         @media print { @page { size: A4; margin: 15mm; } }\n</style>\n</head>\n<body>\n",
    );

    html.push_str("<div class=\"header\">\n");
    html.push_str(&format!("<h1>{}</h1>\n", html_escape(&school.name)));
    html.push_str(&format!("<p>{}</p>\n", html_escape(&school.address)));
    html.push_str(&format!(
        "<p>Telp: {} | Email: {}</p>\n",
        html_escape(&school.phone),
        html_escape(&school.email)
    ));
    html.push_str(&format!("<p>NPSN: {}</p>\n</div>\n", html_escape(&school.npsn)));

    html.push_str("<div class=\"title\"><h2>KUITANSI PEMBAYARAN</h2></div>\n");
    html.push_str(&format!(
        "<div class=\"receipt-no\"><strong>No: {}</strong></div>\n",
        html_escape(&payment.receipt_number)
    ));

    html.push_str("<div class=\"content\">\n");
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">Telah diterima dari</span>: <strong>{}</strong></div>\n",
        html_escape(&payment.student_name)
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">NIS</span>: {}</div>\n",
        html_escape(&payment.student_nis)
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">Kelas</span>: {}</div>\n",
        html_escape(&payment.class_name)
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">Untuk Pembayaran</span>: {}</div>\n",
        html_escape(&payment_purpose(payment))
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">Metode Pembayaran</span>: {}</div>\n",
        payment_method_label(&payment.payment_method)
    ));
    if let Some(notes) = payment.notes.as_deref().filter(|n| !n.is_empty()) {
        html.push_str(&format!(
            "<div class=\"row\"><span class=\"label\">Catatan</span>: {}</div>\n",
            html_escape(notes)
        ));
    }
    if payment.is_installment {
        let seq = match (payment.installment_number, payment.total_installments) {
            (Some(n), Some(t)) => format!("Cicilan ke-{} dari {}", n, t),
            (Some(n), None) => format!("Cicilan ke-{}", n),
            _ => "Cicilan".to_string(),
        };
        let seq = match payment.remaining_amount.filter(|r| *r > 0) {
            Some(r) => format!("{} (sisa {})", seq, format_currency(r)),
            None => seq,
        };
        html.push_str(&format!(
            "<div class=\"row\"><span class=\"label\">Keterangan</span>: {}</div>\n",
            html_escape(&seq)
        ));
    }
    html.push_str("</div>\n");

    html.push_str("<div class=\"amount-box\">\n");
    html.push_str(&format!(
        "<div class=\"amount-row\"><span>Jumlah:</span> <strong>{}</strong></div>\n",
        format_currency(payment.amount)
    ));
    html.push_str(&format!(
        "<div class=\"terbilang\"><strong>Terbilang:</strong> {}</div>\n</div>\n",
        amount_in_words(payment.amount)
    ));

    html.push_str("<div class=\"footer\">\n<div class=\"signature\">\n<p>Penyetor,</p>\n");
    html.push_str(&format!(
        "<div class=\"signature-line\">{}</div>\n</div>\n",
        html_escape(&payment.student_name)
    ));
    html.push_str("<div class=\"signature\">\n");
    html.push_str(&format!("<p>{}</p>\n", html_escape(&payment.payment_date)));
    html.push_str("<p>Bendahara,</p>\n<div class=\"signature-line\">(.....................)</div>\n</div>\n</div>\n");
    html.push_str("</body>\n</html>\n");
    html
}

/// Narrow 80mm layout for thermal printers.
pub fn render_receipt_thermal(payment: &Payment, school: &SchoolInfo) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str(&format!(
        "<title>Kuitansi - {}</title>\n",
        html_escape(&payment.receipt_number)
    ));
    html.push_str(
        "<style>\nbody { font-family: 'Courier New', monospace; width: 80mm; padding: 5mm; font-size: 11px; }\n\
         .center { text-align: center; }\n\
         .bold { font-weight: bold; }\n\
         .line { border-top: 1px dashed #000; margin: 8px 0; }\n\
         .row { display: flex; justify-content: space-between; }\n\
         @media print { @page { margin: 0; size: 80mm auto; } }\n</style>\n</head>\n<body>\n",
    );

    html.push_str("<div class=\"center\">\n");
    html.push_str(&format!(
        "<div class=\"bold\">{}</div>\n",
        html_escape(&school.name)
    ));
    html.push_str(&format!("<div>{}</div>\n", html_escape(&school.address)));
    html.push_str(&format!(
        "<div>Telp: {}</div>\n</div>\n",
        html_escape(&school.phone)
    ));

    html.push_str("<div class=\"line\"></div>\n");
    html.push_str("<div class=\"center bold\">KUITANSI PEMBAYARAN</div>\n");
    html.push_str(&format!(
        "<div class=\"center\">{}</div>\n",
        html_escape(&payment.receipt_number)
    ));
    html.push_str("<div class=\"line\"></div>\n");

    html.push_str(&format!(
        "<div class=\"row\"><span>Tanggal</span><span>{}</span></div>\n",
        html_escape(&payment.payment_date)
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span>NIS</span><span>{}</span></div>\n",
        html_escape(&payment.student_nis)
    ));
    html.push_str(&format!(
        "<div>Nama: <span class=\"bold\">{}</span></div>\n",
        html_escape(&payment.student_name)
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span>Kelas</span><span>{}</span></div>\n",
        html_escape(&payment.class_name)
    ));

    html.push_str("<div class=\"line\"></div>\n");
    html.push_str(&format!(
        "<div>Pembayaran: <span class=\"bold\">{}</span></div>\n",
        html_escape(&payment.payment_type_name)
    ));
    if let Some(m) = payment.month {
        html.push_str(&format!(
            "<div class=\"row\"><span>Bulan</span><span>{} {}</span></div>\n",
            month_name(m as u32),
            payment.year
        ));
    }
    html.push_str(&format!(
        "<div class=\"row\"><span>Metode</span><span>{}</span></div>\n",
        payment_method_label(&payment.payment_method)
    ));

    html.push_str("<div class=\"line\"></div>\n");
    html.push_str("<div class=\"center\">TOTAL BAYAR</div>\n");
    html.push_str(&format!(
        "<div class=\"center bold\">{}</div>\n",
        format_currency(payment.amount)
    ));
    html.push_str(&format!(
        "<div class=\"center\">{}</div>\n",
        amount_in_words(payment.amount)
    ));
    html.push_str("<div class=\"line\"></div>\n");
    html.push_str(
        "<div class=\"center\">Terima kasih</div>\n\
         <div class=\"center\">Simpan kuitansi ini sebagai</div>\n\
         <div class=\"center\">bukti pembayaran yang sah</div>\n",
    );
    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payment() -> Payment {
        Payment {
            id: 1,
            student_id: 1,
            student_name: "Ahmad Rizki".to_string(),
            student_nis: "2024001".to_string(),
            class_name: "7A".to_string(),
            payment_type_id: 1,
            payment_type_name: "SPP".to_string(),
            amount: 150_000,
            month: Some(7),
            year: 2024,
            academic_year_id: 1,
            payment_date: "2024-07-05".to_string(),
            receipt_number: "KWT/20240705/123456".to_string(),
            payment_method: "cash".to_string(),
            notes: None,
            created_by: "admin".to_string(),
            is_installment: false,
            installment_of: None,
            installment_number: None,
            total_installments: None,
            is_paid_off: false,
            original_amount: None,
            remaining_amount: None,
            created_at: "2024-07-05T08:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn words_for_spp_amount() {
        assert_eq!(amount_in_words(150_000), "seratus lima puluh ribu rupiah");
    }

    #[test]
    fn words_cover_special_forms() {
        assert_eq!(amount_in_words(0), "nol rupiah");
        assert_eq!(amount_in_words(1_000), "seribu rupiah");
        assert_eq!(amount_in_words(100), "seratus rupiah");
        assert_eq!(amount_in_words(11), "sebelas rupiah");
        assert_eq!(amount_in_words(21), "dua puluh satu rupiah");
        assert_eq!(
            amount_in_words(1_500_000),
            "satu juta lima ratus ribu rupiah"
        );
        assert_eq!(
            amount_in_words(2_000_000_000),
            "dua milyar rupiah"
        );
        assert_eq!(
            amount_in_words(1_234_567),
            "satu juta dua ratus tiga puluh empat ribu lima ratus enam puluh tujuh rupiah"
        );
    }

    #[test]
    fn currency_uses_dot_grouping() {
        assert_eq!(format_currency(150_000), "Rp 150.000");
        assert_eq!(format_currency(1_234_567), "Rp 1.234.567");
        assert_eq!(format_currency(0), "Rp 0");
        assert_eq!(format_currency(999), "Rp 999");
    }

    #[test]
    fn method_labels_translate() {
        assert_eq!(payment_method_label("cash"), "Tunai");
        assert_eq!(payment_method_label("transfer"), "Transfer");
        assert_eq!(payment_method_label("other"), "Lainnya");
    }

    #[test]
    fn a4_layout_embeds_receipt_fields() {
        let html = render_receipt_a4(&sample_payment(), &default_school_info());
        assert!(html.contains("KUITANSI PEMBAYARAN"));
        assert!(html.contains("KWT/20240705/123456"));
        assert!(html.contains("Ahmad Rizki"));
        assert!(html.contains("SPP - Juli 2024"));
        assert!(html.contains("Tunai"));
        assert!(html.contains("Rp 150.000"));
        assert!(html.contains("seratus lima puluh ribu rupiah"));
    }

    #[test]
    fn thermal_layout_is_narrow_and_complete() {
        let html = render_receipt_thermal(&sample_payment(), &default_school_info());
        assert!(html.contains("80mm"));
        assert!(html.contains("TOTAL BAYAR"));
        assert!(html.contains("Juli 2024"));
        assert!(html.contains("Rp 150.000"));
    }

    #[test]
    fn one_time_payment_omits_month_line() {
        let mut payment = sample_payment();
        payment.month = None;
        payment.payment_type_name = "Seragam".to_string();
        let html = render_receipt_a4(&payment, &default_school_info());
        assert!(html.contains(": Seragam</div>"));
        assert!(!html.contains("Seragam - "));
    }

    #[test]
    fn escapes_markup_in_user_fields() {
        let mut payment = sample_payment();
        payment.student_name = "A <b>B</b> & C".to_string();
        let html = render_receipt_a4(&payment, &default_school_info());
        assert!(html.contains("A &lt;b&gt;B&lt;/b&gt; &amp; C"));
    }
}
